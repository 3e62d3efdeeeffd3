use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::bail;
use bytes::Bytes;

use crate::messaging::session::TransportSession;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SentMessage {
    Request { code: u8, parameters: Bytes },
    Event { code: u8, parameters: Bytes },
    Response { code: u8, return_code: i16, parameters: Bytes },
}

/// A [TransportSession] that records everything sent through it instead of putting it on the
///  wire. Once disconnected, all sends fail.
#[derive(Debug)]
pub struct TrackingSession {
    remote_addr: SocketAddr,
    sent: Mutex<Vec<SentMessage>>,
    is_disconnected: AtomicBool,
}

impl TrackingSession {
    pub fn new(remote_addr: SocketAddr) -> TrackingSession {
        TrackingSession {
            remote_addr,
            sent: Default::default(),
            is_disconnected: AtomicBool::new(false),
        }
    }

    /// returns sent messages, clearing the internal buffer
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        let mut lock = self.sent.lock().expect("tracking session lock poisoned");
        std::mem::take(&mut *lock)
    }

    pub fn is_disconnected(&self) -> bool {
        self.is_disconnected.load(Ordering::Acquire)
    }

    fn record(&self, msg: SentMessage) -> anyhow::Result<()> {
        if self.is_disconnected() {
            bail!("session to {:?} is disconnected", self.remote_addr);
        }
        self.sent.lock().expect("tracking session lock poisoned")
            .push(msg);
        Ok(())
    }
}

impl TransportSession for TrackingSession {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn send_request(&self, code: u8, parameters: Bytes) -> anyhow::Result<()> {
        self.record(SentMessage::Request { code, parameters })
    }

    fn send_event(&self, code: u8, parameters: Bytes) -> anyhow::Result<()> {
        self.record(SentMessage::Event { code, parameters })
    }

    fn send_response(&self, code: u8, return_code: i16, _debug_message: Option<&str>, parameters: Bytes) -> anyhow::Result<()> {
        self.record(SentMessage::Response { code, return_code, parameters })
    }

    fn disconnect(&self) {
        self.is_disconnected.store(true, Ordering::Release);
    }
}
