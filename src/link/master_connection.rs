use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::messaging::codes::{MasterEventCode, MasterOperationCode, MessageCode};
use crate::messaging::handler_set::MasterHandlers;
use crate::messaging::messages::{EventData, OperationRequest, OperationResponse};
use crate::messaging::session::TransportSession;
use crate::node::node_identity::NodeIdentity;

/// The node's end of an established connection to the master. The transport routes all inbound
///  master traffic to this object, and all outbound master traffic goes through it.
///
/// A new instance is created for every successful (re)connection; they all dispatch through the
///  node's single set of master handlers.
pub struct MasterConnection {
    connection_id: u64,
    session: Arc<dyn TransportSession>,
    handlers: Arc<MasterHandlers>,
}

impl Debug for MasterConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterConnection{{#{} to {:?}}}", self.connection_id, self.session.remote_addr())
    }
}

impl MasterConnection {
    pub fn new(connection_id: u64, session: Arc<dyn TransportSession>, handlers: Arc<MasterHandlers>) -> MasterConnection {
        MasterConnection {
            connection_id,
            session,
            handlers,
        }
    }

    /// distinguishes this connection from earlier and later connections to the master
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.session.remote_addr()
    }

    pub fn handlers(&self) -> &Arc<MasterHandlers> {
        &self.handlers
    }

    pub fn send_request(&self, code: MasterOperationCode, parameters: Bytes) -> anyhow::Result<()> {
        trace!("sending request {:?} to master", code);
        self.session.send_request(code.raw(), parameters)
    }

    pub fn send_event(&self, code: MasterEventCode, parameters: Bytes) -> anyhow::Result<()> {
        trace!("sending event {:?} to master", code);
        self.session.send_event(code.raw(), parameters)
    }

    pub fn send_response(&self, code: MasterOperationCode, return_code: i16, debug_message: Option<&str>, parameters: Bytes) -> anyhow::Result<()> {
        self.session.send_response(code.raw(), return_code, debug_message, parameters)
    }

    /// announces this node to the master - sent on every (re)connection
    pub fn register_sub_server(&self, identity: &NodeIdentity) -> anyhow::Result<()> {
        let mut buf = BytesMut::new();
        identity.ser(&mut buf);
        self.send_request(MasterOperationCode::REGISTER_SUB_SERVER, buf.freeze())
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    pub async fn on_request(&self, code: u8, parameters: Bytes) -> bool {
        let request = OperationRequest { code: MasterOperationCode::from_raw(code), parameters };
        self.handlers.dispatch_request(&request, &self.session).await
    }

    pub async fn on_event(&self, code: u8, parameters: Bytes) -> bool {
        let event = EventData { code: MasterEventCode::from_raw(code), parameters };
        self.handlers.dispatch_event(&event, &self.session).await
    }

    pub async fn on_response(&self, code: u8, return_code: i16, debug_message: Option<String>, parameters: Bytes) -> bool {
        let response = OperationResponse {
            code: MasterOperationCode::from_raw(code),
            return_code,
            debug_message,
            parameters,
        };
        self.handlers.dispatch_response(&response, &self.session).await
    }
}
