//! Board Protocol
//!
//! Command/response engine for the acquisition board: frame codec, the
//! byte-stream transport, the shared receive buffer and the command sequencer.

pub mod codec;
pub mod commands;
mod error;
mod rx_buffer;
mod sequencer;
pub mod serial;
mod transport;

pub use commands::Command;
pub use error::{DaqError, TransportError};
pub use rx_buffer::{RxBuffer, WaitOutcome};
pub use sequencer::{duration_to_ticks, Gate, Response, Sequencer, SharedTransport, Timing};
pub use serial::SerialTransport;
pub use transport::{ReceiveCallback, Transport};

/// Default baud rate for the acquisition board
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Length of every outbound frame in bytes
pub const FRAME_LEN: usize = 6;

/// Positive acknowledgement returned for setting commands ("DONE")
pub const ACK: [u8; 4] = *b"DONE";

/// Marker opening each data frame
pub const DATA_HEAD: [u8; 4] = [0xAA, 0xBB, 0x00, 0x00];

/// Marker closing each data frame
pub const DATA_TAIL: [u8; 2] = [0xEE, 0xFF];

/// Default time to wait for a response before concluding nothing more is coming
pub const DEFAULT_WAIT_WINDOW_MS: u64 = 300;

/// Length of one board tick; collection durations go on the wire in ticks
pub const TICK_MS: u64 = 100;
