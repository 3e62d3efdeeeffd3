//! Utilities for testing code that runs on a sub-server: a transport session that records what
//!  is sent through it, and handlers that record or echo what they receive. They are used by
//!  this crate's own tests, and they are exported for testing application handlers.

pub mod handler;
pub mod session;
