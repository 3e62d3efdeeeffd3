//! Inbound connections from other sub-servers.

pub mod peer_gate;
pub mod sub_server_peer;
