use std::sync::Arc;

use async_trait::async_trait;

use crate::messaging::codes::MessageCode;
use crate::messaging::messages::{EventData, OperationRequest, OperationResponse};
use crate::messaging::session::TransportSession;

/// Handles inbound operation requests for one specific code. The session is the one the request
///  arrived on, so handlers can reply through it.
///
/// This is called from the transport's delivery path. Non-trivial work should be offloaded to
///  some asynchronous processing, but it is up to the handler implementation to decide and do
///  this.
#[async_trait]
pub trait RequestHandler<C: MessageCode>: Send + Sync + 'static {
    async fn handle_request(&self, request: &OperationRequest<C>, session: &Arc<dyn TransportSession>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait EventHandler<C: MessageCode>: Send + Sync + 'static {
    async fn handle_event(&self, event: &EventData<C>, session: &Arc<dyn TransportSession>) -> anyhow::Result<()>;
}

/// Handles responses to operation requests this node sent earlier.
#[async_trait]
pub trait ResponseHandler<C: MessageCode>: Send + Sync + 'static {
    async fn handle_response(&self, response: &OperationResponse<C>, session: &Arc<dyn TransportSession>) -> anyhow::Result<()>;
}
