//! The node's outbound connection to the master and its recovery.

pub mod connector;
pub mod master_connection;
pub mod master_link;
