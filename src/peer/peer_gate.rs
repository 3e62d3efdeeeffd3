use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use crate::messaging::handler_set::PeerHandlers;
use crate::messaging::session::TransportSession;
use crate::node::node_behavior::NodeBehavior;
use crate::node::node_identity::SubServerType;
use crate::peer::sub_server_peer::SubServerPeer;

/// What the transport knows about an inbound connection attempt before it is accepted
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingPeerConnection {
    pub remote_addr: SocketAddr,
    /// the sub-server types the connecting node claims to provide
    pub declared_types: SubServerType,
    pub application_id: Option<String>,
}

/// Decides which inbound connections become sub-server peers.
pub struct PeerGate {
    accepts_sub_server_connections: bool,
    behavior: Arc<dyn NodeBehavior>,
    handlers: Arc<PeerHandlers>,
}

impl PeerGate {
    pub fn new(accepts_sub_server_connections: bool, behavior: Arc<dyn NodeBehavior>, handlers: Arc<PeerHandlers>) -> PeerGate {
        PeerGate {
            accepts_sub_server_connections,
            behavior,
            handlers,
        }
    }

    /// Returns `None` if the attempt is rejected, leaving it to the transport to refuse the
    ///  connection.
    pub fn on_incoming_connection_attempt(&self, attempt: &PendingPeerConnection, session: Arc<dyn TransportSession>) -> Option<SubServerPeer> {
        if !self.accepts_sub_server_connections {
            debug!("connection rejected from {} ({:?}): sub-server connections are disabled", attempt.remote_addr, attempt.application_id);
            return None;
        }

        if !self.behavior.is_sub_server_peer(attempt) {
            debug!("connection rejected from {} ({:?})", attempt.remote_addr, attempt.application_id);
            return None;
        }

        debug!("accepted sub-server connection from {} ({:?}, {:?})", attempt.remote_addr, attempt.application_id, attempt.declared_types);
        Some(SubServerPeer::new(session, self.handlers.clone()))
    }
}
