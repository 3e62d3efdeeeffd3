use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::messaging::codes::{MessageCode, PeerEventCode, PeerOperationCode};
use crate::messaging::handler_set::PeerHandlers;
use crate::messaging::messages::{EventData, OperationRequest, OperationResponse};
use crate::messaging::session::TransportSession;

/// An accepted inbound connection from another sub-server.
///
/// All peers of a node dispatch through the node's peer handler set, so handlers registered
///  after a peer was accepted are visible to that peer as well.
pub struct SubServerPeer {
    session: Arc<dyn TransportSession>,
    handlers: Arc<PeerHandlers>,
}

impl Debug for SubServerPeer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubServerPeer{{{:?}}}", self.session.remote_addr())
    }
}

impl SubServerPeer {
    pub fn new(session: Arc<dyn TransportSession>, handlers: Arc<PeerHandlers>) -> SubServerPeer {
        SubServerPeer {
            session,
            handlers,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.session.remote_addr()
    }

    pub fn handlers(&self) -> &Arc<PeerHandlers> {
        &self.handlers
    }

    pub fn send_request(&self, code: PeerOperationCode, parameters: Bytes) -> anyhow::Result<()> {
        self.session.send_request(code.raw(), parameters)
    }

    pub fn send_event(&self, code: PeerEventCode, parameters: Bytes) -> anyhow::Result<()> {
        self.session.send_event(code.raw(), parameters)
    }

    pub fn send_response(&self, code: PeerOperationCode, return_code: i16, debug_message: Option<&str>, parameters: Bytes) -> anyhow::Result<()> {
        self.session.send_response(code.raw(), return_code, debug_message, parameters)
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    pub async fn on_request(&self, code: u8, parameters: Bytes) -> bool {
        let request = OperationRequest { code: PeerOperationCode::from_raw(code), parameters };
        self.handlers.dispatch_request(&request, &self.session).await
    }

    pub async fn on_event(&self, code: u8, parameters: Bytes) -> bool {
        let event = EventData { code: PeerEventCode::from_raw(code), parameters };
        self.handlers.dispatch_event(&event, &self.session).await
    }

    pub async fn on_response(&self, code: u8, return_code: i16, debug_message: Option<String>, parameters: Bytes) -> bool {
        let response = OperationResponse {
            code: PeerOperationCode::from_raw(code),
            return_code,
            debug_message,
            parameters,
        };
        self.handlers.dispatch_response(&response, &self.session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::handler::{EchoHandler, RecordingHandler};
    use crate::test_util::session::{SentMessage, TrackingSession};

    #[tokio::test]
    async fn test_dispatch_through_shared_handlers() {
        let handlers = Arc::new(PeerHandlers::new());
        let session = Arc::new(TrackingSession::new("10.0.0.9:4531".parse().unwrap()));
        let peer = SubServerPeer::new(session.clone(), handlers.clone());

        assert!(!peer.on_event(3, Bytes::new()).await);

        let recording = Arc::new(RecordingHandler::new());
        handlers.events.register(PeerEventCode(3), recording.clone()).unwrap();
        handlers.requests.register(PeerOperationCode(5), Arc::new(EchoHandler)).unwrap();

        assert!(peer.on_event(3, Bytes::from_static(b"late")).await);
        assert!(peer.on_request(5, Bytes::from_static(b"q")).await);
        assert!(!peer.on_response(5, 0, None, Bytes::new()).await);

        assert_eq!(recording.events(), vec![(3, Bytes::from_static(b"late"))]);
        assert_eq!(session.sent_messages(), vec![
            SentMessage::Response { code: 5, return_code: 0, parameters: Bytes::from_static(b"q") },
        ]);
    }

    #[test]
    fn test_send() {
        let session = Arc::new(TrackingSession::new("10.0.0.9:4531".parse().unwrap()));
        let peer = SubServerPeer::new(session.clone(), Arc::new(PeerHandlers::new()));

        peer.send_event(PeerEventCode(2), Bytes::from_static(b"hi")).unwrap();
        peer.send_request(PeerOperationCode(1), Bytes::new()).unwrap();

        assert_eq!(session.sent_messages(), vec![
            SentMessage::Event { code: 2, parameters: Bytes::from_static(b"hi") },
            SentMessage::Request { code: 1, parameters: Bytes::new() },
        ]);

        peer.disconnect();
        assert!(session.is_disconnected());
    }
}
