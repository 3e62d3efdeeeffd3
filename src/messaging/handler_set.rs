use std::sync::Arc;

use tracing::{trace, warn};

use crate::messaging::codes::{MasterEventCode, MasterOperationCode, MessageCode, PeerEventCode, PeerOperationCode};
use crate::messaging::handler::{EventHandler, RequestHandler, ResponseHandler};
use crate::messaging::handler_registry::HandlerRegistry;
use crate::messaging::messages::{EventData, OperationRequest, OperationResponse};
use crate::messaging::session::TransportSession;

/// Handlers for traffic arriving on the master link
pub type MasterHandlers = HandlerSet<MasterOperationCode, MasterEventCode>;

/// Handlers for traffic arriving on sub-server to sub-server links
pub type PeerHandlers = HandlerSet<PeerOperationCode, PeerEventCode>;

/// The three registries used to dispatch traffic of one kind of link. Every connection of that
///  kind shares the same instance, so a message is dispatched the same way regardless of the
///  connection it arrived on.
pub struct HandlerSet<O: MessageCode, E: MessageCode> {
    pub requests: HandlerRegistry<O, dyn RequestHandler<O>>,
    pub events: HandlerRegistry<E, dyn EventHandler<E>>,
    pub responses: HandlerRegistry<O, dyn ResponseHandler<O>>,
}

impl<O: MessageCode, E: MessageCode> Default for HandlerSet<O, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: MessageCode, E: MessageCode> HandlerSet<O, E> {
    pub fn new() -> HandlerSet<O, E> {
        HandlerSet {
            requests: HandlerRegistry::new("request"),
            events: HandlerRegistry::new("event"),
            responses: HandlerRegistry::new("response"),
        }
    }

    /// Returns `false` if there is no handler for the request's code - the request is dropped in
    ///  that case. A failing handler is logged, it does not affect the link.
    pub async fn dispatch_request(&self, request: &OperationRequest<O>, session: &Arc<dyn TransportSession>) -> bool {
        match self.requests.lookup(request.code) {
            Some(handler) => {
                trace!("dispatching request {:?} from {:?}", request.code, session.remote_addr());
                if let Err(e) = handler.handle_request(request, session).await {
                    warn!("handling request {:?} from {:?} failed: {}", request.code, session.remote_addr(), e);
                }
                true
            }
            None => {
                warn!("received request {:?} from {:?} for which there is no handler - dropping it", request.code, session.remote_addr());
                false
            }
        }
    }

    pub async fn dispatch_event(&self, event: &EventData<E>, session: &Arc<dyn TransportSession>) -> bool {
        match self.events.lookup(event.code) {
            Some(handler) => {
                trace!("dispatching event {:?} from {:?}", event.code, session.remote_addr());
                if let Err(e) = handler.handle_event(event, session).await {
                    warn!("handling event {:?} from {:?} failed: {}", event.code, session.remote_addr(), e);
                }
                true
            }
            None => {
                warn!("received event {:?} from {:?} for which there is no handler - dropping it", event.code, session.remote_addr());
                false
            }
        }
    }

    pub async fn dispatch_response(&self, response: &OperationResponse<O>, session: &Arc<dyn TransportSession>) -> bool {
        match self.responses.lookup(response.code) {
            Some(handler) => {
                trace!("dispatching response {:?} ({}) from {:?}", response.code, response.return_code, session.remote_addr());
                if let Err(e) = handler.handle_response(response, session).await {
                    warn!("handling response {:?} from {:?} failed: {}", response.code, session.remote_addr(), e);
                }
                true
            }
            None => {
                warn!("received response {:?} from {:?} for which there is no handler - dropping it", response.code, session.remote_addr());
                false
            }
        }
    }
}
