//! # daqlink Core Library
//!
//! Command/response engine for laboratory data-acquisition boards attached
//! over a serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame encoding for board commands and decoding of acknowledgements and data frames
//! - A serial transport with a background reader feeding a shared receive buffer
//! - A sequencer that keeps exactly one command in flight
//! - An acquisition session with a uninitialized/idle/collecting lifecycle
//!
//! ## Example
//!
//! ```rust,ignore
//! use daqlink_core::prelude::*;
//!
//! let session = AcquisitionSession::serial(Timing::default());
//! session.initialize(&EndpointConfig::new("/dev/ttyUSB0", 115200))?;
//!
//! session.apply(Command::SetGain, 1340)?;
//! let values = session.collect(std::time::Duration::from_secs(5))?;
//! println!("{} values", values.len());
//! ```

pub mod config;
pub mod protocol;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AppConfig, DaqSettings, EndpointConfig, TimingConfig};
    pub use crate::protocol::{Command, DaqError, Response, Timing, TransportError};
    pub use crate::session::{AcquisitionReport, AcquisitionSession, SessionState};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
