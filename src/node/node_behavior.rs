use std::sync::Arc;

#[cfg(test)] use mockall::automock;

use crate::node::node_identity::SubServerType;
use crate::node::worker_node::WorkerNode;
use crate::peer::peer_gate::PendingPeerConnection;

/// The parts of a sub-server that differ between node types. A node's behavior is selected once
///  at construction (see [behavior_for]) and never changes.
#[cfg_attr(test, automock)]
pub trait NodeBehavior: Send + Sync + 'static {
    /// Called once during startup, after the first master connection attempt was issued. An
    ///  error aborts startup.
    fn register_handlers(&self, node: &WorkerNode) -> anyhow::Result<()>;

    /// Decides whether an inbound connection attempt comes from a sub-server this node wants to
    ///  talk to. Only consulted if the node accepts sub-server connections at all.
    fn is_sub_server_peer(&self, _attempt: &PendingPeerConnection) -> bool {
        false
    }

    fn on_stop(&self) {}
}

/// Login and chat servers: all of their traffic comes through the master, and they never talk
///  to other sub-servers directly.
pub struct ChatLoginBehavior;

impl NodeBehavior for ChatLoginBehavior {
    fn register_handlers(&self, _node: &WorkerNode) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Region and world servers exchange state with their neighbours, so they accept connections
///  from sub-servers that declare themselves as region or world servers.
pub struct RegionBehavior;

impl NodeBehavior for RegionBehavior {
    fn register_handlers(&self, _node: &WorkerNode) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_sub_server_peer(&self, attempt: &PendingPeerConnection) -> bool {
        attempt.declared_types.intersects(SubServerType::REGION | SubServerType::WORLD)
    }
}

pub struct DefaultBehavior;

impl NodeBehavior for DefaultBehavior {
    fn register_handlers(&self, _node: &WorkerNode) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Login and chat take precedence if a node combines them with region or world.
pub fn behavior_for(server_type: SubServerType) -> Arc<dyn NodeBehavior> {
    if server_type.intersects(SubServerType::LOGIN | SubServerType::CHAT) {
        Arc::new(ChatLoginBehavior)
    }
    else if server_type.intersects(SubServerType::REGION | SubServerType::WORLD) {
        Arc::new(RegionBehavior)
    }
    else {
        Arc::new(DefaultBehavior)
    }
}
