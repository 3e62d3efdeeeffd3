use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;

use crate::messaging::codes::MessageCode;
use crate::messaging::handler::{EventHandler, RequestHandler, ResponseHandler};
use crate::messaging::messages::{EventData, OperationRequest, OperationResponse};
use crate::messaging::session::TransportSession;

/// Handler for all three message categories, recording raw codes and payloads of everything it
///  is asked to handle.
#[derive(Default)]
pub struct RecordingHandler {
    requests: Mutex<Vec<(u8, Bytes)>>,
    events: Mutex<Vec<(u8, Bytes)>>,
    responses: Mutex<Vec<(u8, i16)>>,
}

impl RecordingHandler {
    pub fn new() -> RecordingHandler {
        Default::default()
    }

    pub fn requests(&self) -> Vec<(u8, Bytes)> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub fn events(&self) -> Vec<(u8, Bytes)> {
        self.events.lock().expect("lock poisoned").clone()
    }

    pub fn responses(&self) -> Vec<(u8, i16)> {
        self.responses.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl<C: MessageCode> RequestHandler<C> for RecordingHandler {
    async fn handle_request(&self, request: &OperationRequest<C>, _session: &Arc<dyn TransportSession>) -> anyhow::Result<()> {
        self.requests.lock().expect("lock poisoned")
            .push((request.code.raw(), request.parameters.clone()));
        Ok(())
    }
}

#[async_trait]
impl<C: MessageCode> EventHandler<C> for RecordingHandler {
    async fn handle_event(&self, event: &EventData<C>, _session: &Arc<dyn TransportSession>) -> anyhow::Result<()> {
        self.events.lock().expect("lock poisoned")
            .push((event.code.raw(), event.parameters.clone()));
        Ok(())
    }
}

#[async_trait]
impl<C: MessageCode> ResponseHandler<C> for RecordingHandler {
    async fn handle_response(&self, response: &OperationResponse<C>, _session: &Arc<dyn TransportSession>) -> anyhow::Result<()> {
        self.responses.lock().expect("lock poisoned")
            .push((response.code.raw(), response.return_code));
        Ok(())
    }
}

/// Replies to every request with the request's payload, echoing it back through the session
pub struct EchoHandler;

#[async_trait]
impl<C: MessageCode> RequestHandler<C> for EchoHandler {
    async fn handle_request(&self, request: &OperationRequest<C>, session: &Arc<dyn TransportSession>) -> anyhow::Result<()> {
        session.send_response(request.code.raw(), 0, None, request.parameters.clone())
    }
}

pub struct FailingHandler;

#[async_trait]
impl<C: MessageCode> RequestHandler<C> for FailingHandler {
    async fn handle_request(&self, request: &OperationRequest<C>, _session: &Arc<dyn TransportSession>) -> anyhow::Result<()> {
        Err(anyhow!("failing on purpose for {:?}", request.code))
    }
}
