use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::bail;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::link::connector::MasterConnector;
use crate::link::master_connection::MasterConnection;
use crate::link::master_link::{run_master_link, LinkCommand, MasterLink, MasterLinkHandle};
use crate::messaging::codes::{MasterEventCode, MasterOperationCode, PeerEventCode, PeerOperationCode};
use crate::messaging::handler::{EventHandler, RequestHandler, ResponseHandler};
use crate::messaging::handler_registry::HandlerError;
use crate::messaging::handler_set::{MasterHandlers, PeerHandlers};
use crate::messaging::session::TransportSession;
use crate::node::node_behavior::{behavior_for, NodeBehavior};
use crate::node::node_config::SubServerConfig;
use crate::node::node_identity::{NodeId, NodeIdentity, SubServerType};
use crate::peer::peer_gate::{PeerGate, PendingPeerConnection};
use crate::peer::sub_server_peer::SubServerPeer;

/// A sub-server process: it keeps a connection to the master alive, dispatches the master's
///  traffic to registered handlers, and accepts connections from other sub-servers if its node
///  type wants them.
///
/// Everything a node needs is owned here and passed on explicitly, so several nodes can live in
///  the same process (which is what the tests do).
pub struct WorkerNode {
    config: Arc<SubServerConfig>,
    identity: Arc<NodeIdentity>,
    behavior: Arc<dyn NodeBehavior>,
    master_handlers: Arc<MasterHandlers>,
    peer_handlers: Arc<PeerHandlers>,
    master_connection: Arc<ArcSwapOption<MasterConnection>>,
    peer_gate: PeerGate,
    link_handle: MasterLinkHandle,
    unstarted_link: Mutex<Option<(MasterLink, mpsc::UnboundedReceiver<LinkCommand>)>>,
    link_driver: Mutex<Option<JoinHandle<()>>>,
    is_ready: AtomicBool,
}

impl WorkerNode {
    pub fn new(config: SubServerConfig, server_type: SubServerType, connector: Arc<dyn MasterConnector>) -> anyhow::Result<WorkerNode> {
        WorkerNode::with_behavior(config, server_type, connector, behavior_for(server_type))
    }

    pub fn with_behavior(config: SubServerConfig, server_type: SubServerType, connector: Arc<dyn MasterConnector>, behavior: Arc<dyn NodeBehavior>) -> anyhow::Result<WorkerNode> {
        config.validate()?;
        let config = Arc::new(config);

        let identity = Arc::new(NodeIdentity {
            id: NodeId::random(),
            server_type,
            public_ip_address: config.public_ip_address,
            gaming_tcp_port: config.gaming_tcp_port,
            gaming_udp_port: config.gaming_udp_port,
        });

        let master_handlers = Arc::new(MasterHandlers::new());
        let peer_handlers = Arc::new(PeerHandlers::new());
        let master_connection = Arc::new(ArcSwapOption::empty());

        let (link, commands) = MasterLink::new(
            config.master_addr,
            config.connect_retry_interval,
            identity.clone(),
            connector,
            master_handlers.clone(),
            master_connection.clone(),
        );
        let link_handle = link.handle();

        let peer_gate = PeerGate::new(config.accepts_sub_server_connections, behavior.clone(), peer_handlers.clone());

        Ok(WorkerNode {
            config,
            identity,
            behavior,
            master_handlers,
            peer_handlers,
            master_connection,
            peer_gate,
            link_handle,
            unstarted_link: Mutex::new(Some((link, commands))),
            link_driver: Default::default(),
            is_ready: AtomicBool::new(false),
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn config(&self) -> &SubServerConfig {
        &self.config
    }

    pub fn master_link(&self) -> &MasterLinkHandle {
        &self.link_handle
    }

    pub fn master_handlers(&self) -> &Arc<MasterHandlers> {
        &self.master_handlers
    }

    pub fn peer_handlers(&self) -> &Arc<PeerHandlers> {
        &self.peer_handlers
    }

    /// `true` once startup completed, i.e. all of the node type's handlers are registered
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Acquire)
    }

    /// Starts the master link, issues the first connection attempt and then registers the node
    ///  type's handlers. If registration fails, the link is shut down again and the error is
    ///  returned.
    pub async fn start(&self) -> anyhow::Result<()> {
        let (link, commands) = match self.unstarted_link.lock().await.take() {
            Some(link) => link,
            None => bail!("sub-server {} was already started or stopped", self.identity.id),
        };

        info!("starting {} sub-server {} ({:?}), master at {}", self.config.application_name, self.identity.id, self.identity.server_type, self.config.master_addr);

        let span = info_span!("sub-server", id = %self.identity.id);
        *self.link_driver.lock().await = Some(tokio::spawn(run_master_link(link, commands).instrument(span)));

        self.link_handle.connect();

        if let Err(e) = self.behavior.register_handlers(self) {
            error!("registering handlers failed, aborting startup: {}", e);
            self.link_handle.shutdown();
            return Err(e);
        }

        self.is_ready.store(true, Ordering::Release);
        info!("sub-server {} started", self.identity.id);
        Ok(())
    }

    /// Runs the node type's stop hook and shuts down the master link, waiting for its driver to
    ///  terminate. A node that was stopped can not be started.
    pub async fn stop(&self) {
        info!("stopping sub-server {}", self.identity.id);
        self.is_ready.store(false, Ordering::Release);
        self.unstarted_link.lock().await.take();
        self.behavior.on_stop();
        self.link_handle.shutdown();

        let driver = self.link_driver.lock().await.take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                error!("master link driver terminated abnormally: {}", e);
            }
        }
    }

    pub fn register_request_handler(&self, code: MasterOperationCode, handler: Arc<dyn RequestHandler<MasterOperationCode>>) -> Result<(), HandlerError> {
        self.master_handlers.requests.register(code, handler)
    }

    pub fn register_event_handler(&self, code: MasterEventCode, handler: Arc<dyn EventHandler<MasterEventCode>>) -> Result<(), HandlerError> {
        self.master_handlers.events.register(code, handler)
    }

    pub fn register_response_handler(&self, code: MasterOperationCode, handler: Arc<dyn ResponseHandler<MasterOperationCode>>) -> Result<(), HandlerError> {
        self.master_handlers.responses.register(code, handler)
    }

    pub fn register_sub_server_request_handler(&self, code: PeerOperationCode, handler: Arc<dyn RequestHandler<PeerOperationCode>>) -> Result<(), HandlerError> {
        self.peer_handlers.requests.register(code, handler)
    }

    pub fn register_sub_server_event_handler(&self, code: PeerEventCode, handler: Arc<dyn EventHandler<PeerEventCode>>) -> Result<(), HandlerError> {
        self.peer_handlers.events.register(code, handler)
    }

    pub fn register_sub_server_response_handler(&self, code: PeerOperationCode, handler: Arc<dyn ResponseHandler<PeerOperationCode>>) -> Result<(), HandlerError> {
        self.peer_handlers.responses.register(code, handler)
    }

    /// `None` while the node is not connected to the master, e.g. during a reconnect
    pub fn master_connection(&self) -> Option<Arc<MasterConnection>> {
        self.master_connection.load_full()
    }

    pub fn send_request_to_master(&self, code: MasterOperationCode, parameters: Bytes) -> anyhow::Result<()> {
        match self.master_connection.load().as_ref() {
            Some(connection) => connection.send_request(code, parameters),
            None => bail!("not connected to master - can not send request {:?}", code),
        }
    }

    pub fn send_event_to_master(&self, code: MasterEventCode, parameters: Bytes) -> anyhow::Result<()> {
        match self.master_connection.load().as_ref() {
            Some(connection) => connection.send_event(code, parameters),
            None => bail!("not connected to master - can not send event {:?}", code),
        }
    }

    pub fn on_incoming_connection_attempt(&self, attempt: &PendingPeerConnection, session: Arc<dyn TransportSession>) -> Option<SubServerPeer> {
        self.peer_gate.on_incoming_connection_attempt(attempt, session)
    }
}

impl Drop for WorkerNode {
    fn drop(&mut self) {
        // the driver closes the master connection and cancels a pending retry on its way out
        self.link_handle.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::time;

    use super::*;
    use crate::link::connector::MockMasterConnector;
    use crate::link::master_link::MasterLinkState;
    use crate::node::node_behavior::MockNodeBehavior;
    use crate::test_util::handler::RecordingHandler;
    use crate::test_util::session::{SentMessage, TrackingSession};

    fn master_addr() -> SocketAddr {
        "127.0.0.1:4520".parse().unwrap()
    }

    fn config() -> SubServerConfig {
        let mut config = SubServerConfig::new(master_addr());
        config.public_ip_address = "10.0.0.5".parse().unwrap();
        config.gaming_tcp_port = Some(4530);
        config
    }

    fn accepting_connector() -> Arc<dyn MasterConnector> {
        let mut connector = MockMasterConnector::new();
        connector.expect_connect_to_server()
            .returning(|_, _| true);
        Arc::new(connector)
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let mut config = config();
        config.connect_retry_interval = Duration::ZERO;
        assert!(WorkerNode::new(config, SubServerType::CHAT, accepting_connector()).is_err());
    }

    #[test]
    fn test_identity_from_config() {
        let a = WorkerNode::new(config(), SubServerType::CHAT | SubServerType::LOGIN, accepting_connector()).unwrap();
        let b = WorkerNode::new(config(), SubServerType::CHAT, accepting_connector()).unwrap();

        assert_eq!(a.identity().server_type, SubServerType::CHAT | SubServerType::LOGIN);
        assert_eq!(a.identity().public_ip_address, config().public_ip_address);
        assert_eq!(a.identity().gaming_tcp_port, Some(4530));
        assert_eq!(a.identity().gaming_udp_port, None);
        assert_ne!(a.identity().id, b.identity().id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_connects_and_registers() {
        let mut connector = MockMasterConnector::new();
        connector.expect_connect_to_server()
            .withf(|endpoint, _| *endpoint == master_addr())
            .times(1)
            .returning(|_, _| true);

        let handler = Arc::new(RecordingHandler::new());
        let mut behavior = MockNodeBehavior::new();
        {
            let handler = handler.clone();
            behavior.expect_register_handlers()
                .times(1)
                .returning(move |node| {
                    node.register_event_handler(MasterEventCode(3), handler.clone())?;
                    node.register_sub_server_request_handler(PeerOperationCode(1), handler.clone())?;
                    Ok(())
                });
        }

        let node = WorkerNode::with_behavior(config(), SubServerType::CHAT, Arc::new(connector), Arc::new(behavior)).unwrap();
        assert!(!node.is_ready());

        node.start().await.unwrap();
        assert!(node.is_ready());
        assert_eq!(node.master_handlers().events.len(), 1);
        assert_eq!(node.peer_handlers().requests.len(), 1);

        settle().await;
        assert_eq!(node.master_link().status().state, MasterLinkState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_registration_aborts_startup() {
        let mut behavior = MockNodeBehavior::new();
        behavior.expect_register_handlers()
            .times(1)
            .returning(|node| {
                node.register_request_handler(MasterOperationCode(7), Arc::new(RecordingHandler::new()))?;
                node.register_request_handler(MasterOperationCode(7), Arc::new(RecordingHandler::new()))?;
                Ok(())
            });

        let node = WorkerNode::with_behavior(config(), SubServerType::CHAT, accepting_connector(), Arc::new(behavior)).unwrap();

        let err = node.start().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HandlerError>(), Some(HandlerError::DuplicateHandler { registry: "request", .. })));
        assert!(!node.is_ready());

        settle().await;
        assert_eq!(node.master_link().status().state, MasterLinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let node = WorkerNode::new(config(), SubServerType::CHAT, accepting_connector()).unwrap();
        node.start().await.unwrap();
        assert!(node.start().await.is_err());
        assert!(node.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_to_master_follows_connection() {
        let node = WorkerNode::new(config(), SubServerType::LOGIN, accepting_connector()).unwrap();
        node.start().await.unwrap();

        assert!(node.master_connection().is_none());
        assert!(node.send_request_to_master(MasterOperationCode(20), Bytes::new()).is_err());
        assert!(node.send_event_to_master(MasterEventCode(20), Bytes::new()).is_err());

        let session = Arc::new(TrackingSession::new(master_addr()));
        let connection = node.master_link().on_connection_established(session.clone());
        settle().await;

        assert!(Arc::ptr_eq(&node.master_connection().unwrap(), &connection));
        // registration goes out first
        assert_eq!(session.sent_messages().len(), 1);

        node.send_request_to_master(MasterOperationCode(20), Bytes::from_static(b"r")).unwrap();
        node.send_event_to_master(MasterEventCode(21), Bytes::from_static(b"e")).unwrap();
        assert_eq!(session.sent_messages(), vec![
            SentMessage::Request { code: 20, parameters: Bytes::from_static(b"r") },
            SentMessage::Event { code: 21, parameters: Bytes::from_static(b"e") },
        ]);

        node.master_link().on_connection_lost(connection.connection_id(), "reset");
        settle().await;
        assert!(node.master_connection().is_none());
        assert!(node.send_request_to_master(MasterOperationCode(20), Bytes::new()).is_err());
        assert_eq!(node.master_link().status().state, MasterLinkState::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_scenario() {
        let mut cfg = config();
        cfg.connect_retry_interval = Duration::from_secs(5);
        let node = WorkerNode::new(cfg, SubServerType::CHAT, accepting_connector()).unwrap();
        node.start().await.unwrap();
        settle().await;

        let link = node.master_link();
        assert_eq!(link.status().num_attempts, 1);

        link.on_connection_failed(10, "connection refused");
        settle().await;
        assert!(link.status().is_reconnecting);

        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(link.status().num_attempts, 2);

        link.on_connection_failed(10, "connection refused");
        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(link.status().num_attempts, 3);

        link.on_connection_established(Arc::new(TrackingSession::new(master_addr())));
        settle().await;
        assert!(!link.status().is_reconnecting);
        assert!(node.master_connection().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlers_registered_after_connect_are_used() {
        let node = WorkerNode::new(config(), SubServerType::CHAT, accepting_connector()).unwrap();
        node.start().await.unwrap();

        let connection = node.master_link().on_connection_established(Arc::new(TrackingSession::new(master_addr())));
        settle().await;

        let handler = Arc::new(RecordingHandler::new());
        node.register_response_handler(MasterOperationCode(4), handler.clone()).unwrap();

        assert!(connection.on_response(4, 52, Some("not supported".to_string()), Bytes::new()).await);
        assert_eq!(handler.responses(), vec![(4, 52)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_connections() {
        let attempt = PendingPeerConnection {
            remote_addr: "10.0.0.9:4531".parse().unwrap(),
            declared_types: SubServerType::REGION,
            application_id: None,
        };
        let session = || -> Arc<dyn TransportSession> { Arc::new(TrackingSession::new("10.0.0.9:4531".parse().unwrap())) };

        let mut cfg = config();
        cfg.accepts_sub_server_connections = true;
        let region = WorkerNode::new(cfg.clone(), SubServerType::REGION, accepting_connector()).unwrap();
        let peer = region.on_incoming_connection_attempt(&attempt, session()).unwrap();
        assert!(Arc::ptr_eq(peer.handlers(), region.peer_handlers()));

        let chat = WorkerNode::new(cfg, SubServerType::CHAT, accepting_connector()).unwrap();
        assert!(chat.on_incoming_connection_attempt(&attempt, session()).is_none());

        let disabled = WorkerNode::new(config(), SubServerType::REGION, accepting_connector()).unwrap();
        assert!(disabled.on_incoming_connection_attempt(&attempt, session()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop() {
        let mut behavior = MockNodeBehavior::new();
        behavior.expect_register_handlers()
            .returning(|_| Ok(()));
        behavior.expect_on_stop()
            .times(1)
            .return_const(());

        let node = WorkerNode::with_behavior(config(), SubServerType::WORLD, accepting_connector(), Arc::new(behavior)).unwrap();
        node.start().await.unwrap();

        let session = Arc::new(TrackingSession::new(master_addr()));
        node.master_link().on_connection_established(session.clone());
        settle().await;
        assert!(node.master_connection().is_some());

        node.stop().await;

        assert!(!node.is_ready());
        assert!(node.master_connection().is_none());
        assert!(session.is_disconnected());
        assert_eq!(node.master_link().status().state, MasterLinkState::Disconnected);
    }
    #[tokio::test(start_paused = true)]
    async fn test_dropped_node_stops_reconnecting() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut connector = MockMasterConnector::new();
        {
            let attempts = attempts.clone();
            connector.expect_connect_to_server()
                .returning(move |_, _| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    true
                });
        }

        let node = WorkerNode::new(config(), SubServerType::CHAT, Arc::new(connector)).unwrap();
        node.start().await.unwrap();
        let link = node.master_link().clone();
        settle().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        link.on_connection_failed(10, "connection refused");
        drop(node);
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(link.status().state, MasterLinkState::Disconnected);

        let session = Arc::new(TrackingSession::new(master_addr()));
        link.on_connection_established(session.clone());
        assert!(session.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_established_after_stop_is_closed() {
        let node = WorkerNode::new(config(), SubServerType::CHAT, accepting_connector()).unwrap();
        node.start().await.unwrap();
        node.stop().await;

        let session = Arc::new(TrackingSession::new(master_addr()));
        node.master_link().on_connection_established(session.clone());
        settle().await;

        assert!(session.is_disconnected());
        assert!(node.master_connection().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_stop_fails() {
        let mut connector = MockMasterConnector::new();
        connector.expect_connect_to_server().never();

        let node = WorkerNode::new(config(), SubServerType::CHAT, Arc::new(connector)).unwrap();
        node.stop().await;

        assert!(node.start().await.is_err());
        assert!(!node.is_ready());
        settle().await;
        assert_eq!(node.master_link().status().state, MasterLinkState::Disconnected);
    }
}
