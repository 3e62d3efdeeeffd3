use std::fmt::Debug;
use std::net::SocketAddr;

use bytes::Bytes;

/// A single established connection as provided by the underlying peer transport. This is the
///  only way outbound traffic leaves the node; framing and serialization of the message envelope
///  are the transport's business.
///
/// Sending does not block: implementations enqueue the message and report an error if the
///  session is closed.
pub trait TransportSession: Debug + Send + Sync + 'static {
    fn remote_addr(&self) -> SocketAddr;

    fn send_request(&self, code: u8, parameters: Bytes) -> anyhow::Result<()>;

    fn send_event(&self, code: u8, parameters: Bytes) -> anyhow::Result<()>;

    fn send_response(&self, code: u8, return_code: i16, debug_message: Option<&str>, parameters: Bytes) -> anyhow::Result<()>;

    fn disconnect(&self);
}
