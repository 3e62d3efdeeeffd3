use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn, Level};

use crate::link::connector::MasterConnector;
use crate::link::master_connection::MasterConnection;
use crate::messaging::handler_set::MasterHandlers;
use crate::messaging::session::TransportSession;
use crate::node::node_identity::NodeIdentity;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MasterLinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Snapshot of the link's state, published after every processed command
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkStatus {
    pub state: MasterLinkState,
    pub is_reconnecting: bool,
    /// number of connection attempts the transport accepted so far
    pub num_attempts: u64,
}

pub enum LinkCommand {
    Connect,
    Established(Arc<MasterConnection>),
    Failed {
        error_code: i32,
        error_message: String,
    },
    Lost {
        connection_id: u64,
        reason: String,
    },
    Shutdown,
}

/// The master link's callback surface. The transport reports connection outcomes here, and
///  the retry timer requests new attempts here. Calls only enqueue a command for the link's
///  driver task, so they never block and never race with each other.
#[derive(Clone)]
pub struct MasterLinkHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
    status: watch::Receiver<LinkStatus>,
    handlers: Arc<MasterHandlers>,
    next_connection_id: Arc<AtomicU64>,
}

impl Debug for MasterLinkHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterLinkHandle{{{:?}}}", self.status.borrow().state)
    }
}

impl MasterLinkHandle {
    pub fn connect(&self) {
        self.send(LinkCommand::Connect);
    }

    /// Wraps a freshly established transport session into the connection object that routes
    ///  master traffic. The object is returned immediately so the transport can start delivering
    ///  messages to it; it becomes the node's current master connection once the link has
    ///  processed the transition.
    ///
    /// If the link is already shut down, the connection is disconnected right away.
    pub fn on_connection_established(&self, session: Arc<dyn TransportSession>) -> Arc<MasterConnection> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(MasterConnection::new(connection_id, session, self.handlers.clone()));
        if !self.send(LinkCommand::Established(connection.clone())) {
            debug!("closing master connection #{} established after shutdown", connection_id);
            connection.disconnect();
        }
        connection
    }

    pub fn on_connection_failed(&self, error_code: i32, error_message: impl Into<String>) {
        self.send(LinkCommand::Failed {
            error_code,
            error_message: error_message.into(),
        });
    }

    /// to be called when an established connection drops
    pub fn on_connection_lost(&self, connection_id: u64, reason: impl Into<String>) {
        self.send(LinkCommand::Lost {
            connection_id,
            reason: reason.into(),
        });
    }

    pub fn shutdown(&self) {
        self.send(LinkCommand::Shutdown);
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    fn send(&self, command: LinkCommand) -> bool {
        if self.commands.send(command).is_err() {
            debug!("master link is shut down - ignoring command");
            return false;
        }
        true
    }
}

/// At most one pending retry: arming the timer aborts a previously armed one.
#[derive(Default)]
struct RetryTimer {
    pending: Option<JoinHandle<()>>,
}

impl RetryTimer {
    fn arm(&mut self, delay: Duration, commands: mpsc::UnboundedSender<LinkCommand>) {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = commands.send(LinkCommand::Connect);
        }));
    }

    fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.pending.as_ref()
            .map(|p| !p.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns the node's single outbound connection to the master, recovering it indefinitely at a
///  fixed interval.
///
/// All state transitions happen in [run_master_link], one command at a time.
pub struct MasterLink {
    endpoint: SocketAddr,
    retry_interval: Duration,
    identity: Arc<NodeIdentity>,
    connector: Arc<dyn MasterConnector>,
    master_connection: Arc<ArcSwapOption<MasterConnection>>,
    commands: mpsc::UnboundedSender<LinkCommand>,
    handle: MasterLinkHandle,
    status: watch::Sender<LinkStatus>,
    state: MasterLinkState,
    /// set by the first failure after a successful connect, cleared by the next success
    is_reconnecting: bool,
    num_attempts: u64,
    retry_timer: RetryTimer,
}

impl MasterLink {
    pub fn new(
        endpoint: SocketAddr,
        retry_interval: Duration,
        identity: Arc<NodeIdentity>,
        connector: Arc<dyn MasterConnector>,
        handlers: Arc<MasterHandlers>,
        master_connection: Arc<ArcSwapOption<MasterConnection>>,
    ) -> (MasterLink, mpsc::UnboundedReceiver<LinkCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let initial_status = LinkStatus {
            state: MasterLinkState::Disconnected,
            is_reconnecting: false,
            num_attempts: 0,
        };
        let (status, status_receiver) = watch::channel(initial_status);

        let handle = MasterLinkHandle {
            commands: commands.clone(),
            status: status_receiver,
            handlers,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        };

        let link = MasterLink {
            endpoint,
            retry_interval,
            identity,
            connector,
            master_connection,
            commands,
            handle,
            status,
            state: MasterLinkState::Disconnected,
            is_reconnecting: false,
            num_attempts: 0,
            retry_timer: Default::default(),
        };
        (link, receiver)
    }

    pub fn handle(&self) -> MasterLinkHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> MasterLinkState {
        self.state
    }

    pub fn is_reconnecting(&self) -> bool {
        self.is_reconnecting
    }

    pub fn is_retry_armed(&self) -> bool {
        self.retry_timer.is_armed()
    }

    /// Starts a connection attempt. Returns `false` if no attempt was started.
    ///
    /// If the transport refuses because an attempt is already pending, no retry is scheduled:
    ///  the pending attempt will report its own outcome.
    pub fn connect(&mut self) -> bool {
        if self.state == MasterLinkState::Connected {
            debug!("already connected to master at {} - skipping connection attempt", self.endpoint);
            return false;
        }

        if !self.connector.connect_to_server(self.endpoint, self.handle.clone()) {
            warn!("master connection refused");
            return false;
        }

        self.num_attempts += 1;
        if self.is_reconnecting {
            debug!("reconnecting to master at {}", self.endpoint);
        }
        else {
            debug!("connecting to master at {}", self.endpoint);
        }
        self.state = MasterLinkState::Connecting;
        self.publish_status();
        true
    }

    pub fn on_connection_established(&mut self, connection: Arc<MasterConnection>) {
        self.is_reconnecting = false;
        self.retry_timer.cancel();

        info!("connected to master at {} (connection #{})", connection.remote_addr(), connection.connection_id());
        if let Some(previous) = self.master_connection.swap(Some(connection.clone())) {
            if previous.connection_id() != connection.connection_id() {
                debug!("replacing stale master connection #{}", previous.connection_id());
                previous.disconnect();
            }
        }
        self.state = MasterLinkState::Connected;

        if let Err(e) = connection.register_sub_server(&self.identity) {
            warn!("error registering with master at {}: {}", connection.remote_addr(), e);
        }
        self.publish_status();
    }

    /// Returns the severity the failure was logged with, or `None` if it was ignored because the
    ///  link is connected.
    pub fn on_connection_failed(&mut self, error_code: i32, error_message: &str) -> Option<Level> {
        if self.state == MasterLinkState::Connected {
            debug!("ignoring connection failure with err {} while connected to master: {}", error_code, error_message);
            return None;
        }

        let severity = self.failure_severity();
        if severity == Level::ERROR {
            error!("master connection failed with err {}: {}", error_code, error_message);
        }
        else {
            debug!("master connection failed with err {}: {}", error_code, error_message);
        }

        self.schedule_retry();
        Some(severity)
    }

    /// Returns `None` if the lost connection is not the current one.
    pub fn on_connection_lost(&mut self, connection_id: u64, reason: &str) -> Option<Level> {
        let is_current = self.master_connection.load()
            .as_ref()
            .map(|c| c.connection_id() == connection_id)
            .unwrap_or(false);
        if !is_current {
            debug!("ignoring loss of master connection #{} which is not current: {}", connection_id, reason);
            return None;
        }

        self.master_connection.store(None);

        let severity = self.failure_severity();
        if severity == Level::ERROR {
            error!("master connection #{} lost: {}", connection_id, reason);
        }
        else {
            debug!("master connection #{} lost: {}", connection_id, reason);
        }

        self.schedule_retry();
        Some(severity)
    }

    pub fn schedule_retry(&mut self) {
        self.is_reconnecting = true;
        self.state = MasterLinkState::Reconnecting;
        debug!("retrying master connection in {:?}", self.retry_interval);
        self.retry_timer.arm(self.retry_interval, self.commands.clone());
        self.publish_status();
    }

    fn failure_severity(&self) -> Level {
        if self.is_reconnecting {
            Level::DEBUG
        }
        else {
            Level::ERROR
        }
    }

    fn shut_down(&mut self) {
        self.retry_timer.cancel();
        if let Some(connection) = self.master_connection.swap(None) {
            connection.disconnect();
        }
        self.state = MasterLinkState::Disconnected;
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.send_replace(LinkStatus {
            state: self.state,
            is_reconnecting: self.is_reconnecting,
            num_attempts: self.num_attempts,
        });
    }
}

/// Processes the link's commands until it is shut down. Commands are handled strictly one at a
///  time, so connection callbacks delivered concurrently by the transport are serialized here.
pub async fn run_master_link(mut link: MasterLink, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
    info!("starting master link to {}", link.endpoint);

    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Connect => {
                link.connect();
            }
            LinkCommand::Established(connection) => {
                link.on_connection_established(connection);
            }
            LinkCommand::Failed { error_code, error_message } => {
                link.on_connection_failed(error_code, &error_message);
            }
            LinkCommand::Lost { connection_id, reason } => {
                link.on_connection_lost(connection_id, &reason);
            }
            LinkCommand::Shutdown => {
                break;
            }
        }
    }

    // connections established while shutting down are never published
    commands.close();
    while let Ok(command) = commands.try_recv() {
        if let LinkCommand::Established(connection) = command {
            debug!("closing master connection #{} established after shutdown", connection.connection_id());
            connection.disconnect();
        }
    }

    link.shut_down();
    info!("master link to {} stopped", link.endpoint);
}
