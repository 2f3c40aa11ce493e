//! Protocol errors

use thiserror::Error;

/// Errors raised by the byte-stream transport.
///
/// Any of these is fatal to the current session: the caller has to
/// uninitialize and initialize again to recover.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint could not be claimed
    #[error("Failed to open '{port}': {reason}")]
    Open {
        /// Port that was asked for
        port: String,
        /// Why the open failed
        reason: String,
    },

    /// `open` on a transport that already holds an endpoint
    #[error("Transport is already open")]
    AlreadyOpen,

    /// Write without an open endpoint
    #[error("Transport is not open")]
    NotOpen,

    /// Serial driver failure outside a read or write
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the acquisition session
#[derive(Error, Debug)]
pub enum DaqError {
    /// Transport failure; the session must be reinitialized
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Operation not allowed in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DaqError {
    /// True if this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, DaqError::Transport(_))
    }
}
