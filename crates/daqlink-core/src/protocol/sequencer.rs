//! Command sequencing
//!
//! Turns one [`Command`] into one logical result. Only a single command is in
//! flight at a time: every `issue` holds the gate from the write until its
//! response (or stream of data frames) has been consumed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{codec, Command, RxBuffer, Transport, TransportError, DEFAULT_WAIT_WINDOW_MS, TICK_MS};

/// Shared handle to the transport; the session opens and closes it, the
/// sequencer writes through it.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Sequencer timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long to wait for a response before concluding nothing more is coming
    pub wait_window: Duration,
    /// Wait between buffer checks while collecting
    pub poll_interval: Duration,
    /// Pause between setting commands in a full acquisition run
    pub setting_gap: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            wait_window: Duration::from_millis(DEFAULT_WAIT_WINDOW_MS),
            poll_interval: Duration::from_millis(DEFAULT_WAIT_WINDOW_MS),
            setting_gap: Duration::from_millis(100),
        }
    }
}

/// Result of issuing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Written; the command has no reply
    Sent,
    /// Setting command outcome: `true` on an exact acknowledgement
    Ack(bool),
    /// Every value decoded during a collection, in arrival order
    Collected(Vec<u16>),
}

impl Response {
    /// Check if the command completed without a negative acknowledgement
    pub fn is_ok(&self) -> bool {
        !matches!(self, Response::Ack(false))
    }

    /// Collected values, if this was a collection
    pub fn values(&self) -> Option<&[u16]> {
        match self {
            Response::Collected(values) => Some(values),
            _ => None,
        }
    }
}

/// Convert a collection duration in milliseconds to board ticks
pub fn duration_to_ticks(duration: Duration) -> i32 {
    let ticks = duration.as_millis() / TICK_MS as u128;
    i32::try_from(ticks).unwrap_or(i32::MAX)
}

/// Gate serializing `issue` calls; sequencers sharing one never overlap
pub type Gate = Arc<Mutex<()>>;

/// Single-in-flight command engine over a transport and its receive buffer
pub struct Sequencer {
    transport: SharedTransport,
    rx: Arc<RxBuffer>,
    gate: Gate,
    timing: Timing,
}

impl Sequencer {
    /// Create a sequencer with a gate of its own
    pub fn new(transport: SharedTransport, rx: Arc<RxBuffer>, timing: Timing) -> Self {
        Self::with_gate(transport, rx, Gate::default(), timing)
    }

    /// Create a sequencer that shares `gate` with other sequencers on the
    /// same link, so a command on one waits out a command on another.
    pub fn with_gate(
        transport: SharedTransport,
        rx: Arc<RxBuffer>,
        gate: Gate,
        timing: Timing,
    ) -> Self {
        Self {
            transport,
            rx,
            gate,
            timing,
        }
    }

    /// Timing this sequencer waits with
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Issue a command and wait for its result.
    ///
    /// For [`Command::StartCollect`] the parameter is the collection duration
    /// in milliseconds; negative values collect for zero time. Every other
    /// command sends `parameter` as-is.
    pub fn issue(&self, command: Command, parameter: i32) -> Result<Response, TransportError> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Issuing {} ({})", command, parameter);

        match command {
            Command::Reset => {
                self.send(command, parameter)?;
                info!("Reset command sent");
                Ok(Response::Sent)
            }
            Command::StartCollect => {
                let duration = Duration::from_millis(parameter.max(0) as u64);
                self.collect(duration).map(Response::Collected)
            }
            _ => self.apply_setting(command, parameter).map(Response::Ack),
        }
    }

    fn lock_transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command, parameter: i32) -> Result<(), TransportError> {
        let stale = self.rx.reset();
        if stale > 0 {
            debug!("Discarded {} stale bytes before {}", stale, command);
        }
        let frame = codec::encode(command, parameter);
        self.lock_transport().write(&frame)
    }

    fn apply_setting(&self, command: Command, parameter: i32) -> Result<bool, TransportError> {
        self.send(command, parameter)?;

        // A single wait: the board answers settings in one burst
        self.rx.wait(self.timing.wait_window);
        let response = self.rx.drain();
        let ok = codec::decode_ack(&response);
        if ok {
            info!("{} = {} acknowledged", command, parameter);
        } else if response.is_empty() {
            warn!("{} = {}: no response", command, parameter);
        } else {
            warn!(
                "{} = {}: unexpected response {}",
                command,
                parameter,
                codec::to_hex(&response)
            );
        }
        Ok(ok)
    }

    fn collect(&self, duration: Duration) -> Result<Vec<u16>, TransportError> {
        let start = Instant::now();
        let deadline = start + duration + self.timing.wait_window;

        self.send(Command::StartCollect, duration_to_ticks(duration))?;
        info!("Data collection started ({:?})", duration);

        let mut values = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.rx.wait(self.timing.poll_interval.min(deadline - now));

            let chunk = self.rx.drain();
            if chunk.is_empty() {
                continue;
            }
            pending.extend_from_slice(&chunk);
            let (complete, rest) = codec::split_at_last_tail(&pending);
            values.extend(codec::decode_values(complete));
            pending = rest.to_vec();
        }

        pending.extend(self.rx.drain());
        if !pending.is_empty() {
            values.extend(codec::decode_values(&pending));
        }

        info!(
            "Data collection stopped: {} values in {:?}",
            values.len(),
            start.elapsed()
        );
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_ticks() {
        assert_eq!(duration_to_ticks(Duration::from_millis(0)), 0);
        assert_eq!(duration_to_ticks(Duration::from_millis(99)), 0);
        assert_eq!(duration_to_ticks(Duration::from_millis(500)), 5);
        assert_eq!(duration_to_ticks(Duration::from_secs(10)), 100);
        assert_eq!(duration_to_ticks(Duration::MAX), i32::MAX);
    }

    #[test]
    fn test_response_helpers() {
        assert!(Response::Sent.is_ok());
        assert!(Response::Ack(true).is_ok());
        assert!(!Response::Ack(false).is_ok());
        assert_eq!(Response::Collected(vec![1, 2]).values(), Some(&[1u16, 2][..]));
        assert_eq!(Response::Ack(true).values(), None);
    }
}
