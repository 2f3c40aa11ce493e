use crate::config::EndpointConfig;

use super::TransportError;

/// Called from the transport's reader context with each chunk of bytes as it
/// arrives. Implementations must return quickly.
pub type ReceiveCallback = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Abstraction over the byte-stream link to the board
pub trait Transport: Send {
    /// Claim the endpoint, discard stale buffers and start delivering
    /// received bytes to `on_receive`.
    fn open(
        &mut self,
        endpoint: &EndpointConfig,
        on_receive: ReceiveCallback,
    ) -> Result<(), TransportError>;

    /// Write the whole buffer or fail
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Stop delivery and release the endpoint. Safe to call repeatedly, and
    /// when never opened.
    fn close(&mut self);

    /// Check if the endpoint is currently held
    fn is_open(&self) -> bool;
}
