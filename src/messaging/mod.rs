pub mod codes;
pub mod handler;
pub mod handler_registry;
pub mod handler_set;
pub mod messages;
pub mod session;
