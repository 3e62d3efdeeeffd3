use std::net::SocketAddr;

#[cfg(test)] use mockall::automock;

use crate::link::master_link::MasterLinkHandle;

/// The peer transport's API for opening outbound server-to-server connections.
///
/// The outcome of an attempt is reported asynchronously through the [MasterLinkHandle]:
///  exactly one of `on_connection_established` or `on_connection_failed` per accepted attempt.
#[cfg_attr(test, automock)]
pub trait MasterConnector: Send + Sync + 'static {
    /// Returns `false` if the transport refuses to start the attempt, typically because an earlier
    ///  attempt is still pending. No outcome is reported for a refused attempt.
    fn connect_to_server(&self, endpoint: SocketAddr, link: MasterLinkHandle) -> bool;
}
