//! Acquisition session
//!
//! Lifecycle of the link to one acquisition board. This is the only type the
//! application talks to: it opens and closes the transport, routes commands
//! through the sequencer and publishes each completed collection as an event.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{DaqSettings, EndpointConfig};
use crate::protocol::{
    Command, DaqError, Gate, Response, RxBuffer, Sequencer, SerialTransport, SharedTransport,
    Timing, Transport,
};

/// Number of undelivered collections kept for slow subscribers
const EVENT_CAPACITY: usize = 16;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Transport closed
    Uninitialized,
    /// Transport open, ready for commands
    Idle,
    /// A collection is running
    Collecting,
}

/// Outcome of [`AcquisitionSession::acquire`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Each setting command with whether the board acknowledged it
    pub acknowledgements: Vec<(Command, bool)>,
    /// Values collected after the settings were applied
    pub values: Vec<u16>,
}

impl AcquisitionReport {
    /// Check if every setting was acknowledged
    pub fn all_acknowledged(&self) -> bool {
        self.acknowledgements.iter().all(|(_, ok)| *ok)
    }
}

struct Inner {
    state: SessionState,
    endpoint: Option<EndpointConfig>,
    sequencer: Option<Arc<Sequencer>>,
    /// Bumped on every initialize so a collection that outlives its
    /// connection cannot touch the state of the next one
    generation: u64,
}

/// Connection to one acquisition board
pub struct AcquisitionSession {
    transport: SharedTransport,
    /// Outlives every connection, so a collection still running from before
    /// an uninitialize holds off commands on the next connection
    gate: Gate,
    inner: Mutex<Inner>,
    timing: Timing,
    events: broadcast::Sender<Vec<u16>>,
}

impl AcquisitionSession {
    /// Create a session over the given transport (not yet initialized)
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_timing(transport, Timing::default())
    }

    /// Create a session with custom sequencer timing
    pub fn with_timing(transport: Box<dyn Transport>, timing: Timing) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport: Arc::new(Mutex::new(transport)),
            gate: Gate::default(),
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                endpoint: None,
                sequencer: None,
                generation: 0,
            }),
            timing,
            events,
        }
    }

    /// Create a session that talks over a serial port
    pub fn serial(timing: Timing) -> Self {
        Self::with_timing(Box::new(SerialTransport::new()), timing)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every completed collection as one batch of values
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u16>> {
        self.events.subscribe()
    }

    /// Get current session state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Endpoint the session is connected to, if any
    pub fn endpoint(&self) -> Option<EndpointConfig> {
        self.lock().endpoint.clone()
    }

    /// Check if the transport is open
    pub fn is_initialized(&self) -> bool {
        self.state() != SessionState::Uninitialized
    }

    /// Sequencer timing used for every connection
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Open the transport and start buffering received bytes.
    ///
    /// Initializing again with the same endpoint does nothing; a different
    /// endpoint is rejected until the session is uninitialized.
    pub fn initialize(&self, endpoint: &EndpointConfig) -> Result<(), DaqError> {
        let mut inner = self.lock();

        if inner.state != SessionState::Uninitialized {
            return match &inner.endpoint {
                Some(current) if current == endpoint => {
                    debug!("Already initialized on {}", endpoint.port);
                    Ok(())
                }
                Some(current) => Err(DaqError::InvalidState(format!(
                    "already initialized on '{}', cannot switch to '{}'",
                    current.port, endpoint.port
                ))),
                None => Err(DaqError::InvalidState("session has no endpoint".into())),
            };
        }

        let rx = Arc::new(RxBuffer::new());
        let sink = Arc::clone(&rx);
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open(endpoint, Box::new(move |bytes| sink.append(bytes)))?;

        inner.sequencer = Some(Arc::new(Sequencer::with_gate(
            Arc::clone(&self.transport),
            rx,
            Arc::clone(&self.gate),
            self.timing,
        )));
        inner.endpoint = Some(endpoint.clone());
        inner.generation += 1;
        inner.state = SessionState::Idle;

        info!("Session initialized on {}", endpoint.port);
        Ok(())
    }

    /// Close the transport. No-op when not initialized.
    pub fn uninitialize(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Uninitialized {
            return;
        }

        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();

        inner.sequencer = None;
        inner.state = SessionState::Uninitialized;
        if let Some(endpoint) = inner.endpoint.take() {
            info!("Session uninitialized on {}", endpoint.port);
        }
    }

    /// Issue one command to the board.
    ///
    /// For [`Command::StartCollect`] the parameter is the collection duration
    /// in milliseconds; the session reports `Collecting` until the collection
    /// finishes and then publishes the values to subscribers. A negative
    /// acknowledgement comes back as `Response::Ack(false)`, not as an error.
    pub fn write_command(&self, command: Command, parameter: i32) -> Result<Response, DaqError> {
        info!("Command writing: {} value {}", command, parameter);

        if command == Command::StartCollect && parameter < 0 {
            return Err(DaqError::InvalidState(format!(
                "collection duration must not be negative (got {} ms)",
                parameter
            )));
        }

        let (sequencer, generation) = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Uninitialized => {
                    return Err(DaqError::InvalidState("session is not initialized".into()))
                }
                SessionState::Collecting => {
                    return Err(DaqError::InvalidState(
                        "a collection is already in progress".into(),
                    ))
                }
                SessionState::Idle => {}
            }
            let sequencer = inner
                .sequencer
                .clone()
                .ok_or_else(|| DaqError::InvalidState("session has no sequencer".into()))?;
            if command == Command::StartCollect {
                inner.state = SessionState::Collecting;
            }
            (sequencer, inner.generation)
        };

        let collecting = (command == Command::StartCollect).then(|| CollectingGuard {
            session: self,
            generation,
        });
        let response = sequencer.issue(command, parameter);
        drop(collecting);

        let response = response?;
        if let Response::Collected(values) = &response {
            self.publish(values.clone());
        }
        Ok(response)
    }

    /// Stop the board and reset it
    pub fn reset(&self) -> Result<(), DaqError> {
        self.write_command(Command::Reset, 0).map(|_| ())
    }

    /// Apply one setting; `Ok(false)` means the board did not acknowledge it
    pub fn apply(&self, command: Command, value: i32) -> Result<bool, DaqError> {
        if !command.is_setting() {
            return Err(DaqError::InvalidState(format!(
                "{} is not a setting command",
                command
            )));
        }
        let response = self.write_command(command, value)?;
        Ok(matches!(response, Response::Ack(true)))
    }

    /// Collect for `duration` and return the decoded values
    pub fn collect(&self, duration: Duration) -> Result<Vec<u16>, DaqError> {
        let millis = i32::try_from(duration.as_millis()).map_err(|_| {
            DaqError::InvalidState(format!("collection duration {:?} is too long", duration))
        })?;
        match self.write_command(Command::StartCollect, millis)? {
            Response::Collected(values) => Ok(values),
            other => Err(DaqError::InvalidState(format!(
                "unexpected response to collection: {:?}",
                other
            ))),
        }
    }

    /// Apply every setting in order, then collect for the configured duration.
    ///
    /// Unacknowledged settings are logged and recorded in the report; the run
    /// continues regardless.
    pub fn acquire(&self, settings: &DaqSettings) -> Result<AcquisitionReport, DaqError> {
        let mut acknowledgements = Vec::with_capacity(Command::SETTINGS.len());
        for (command, value) in settings.commands() {
            if !self.timing.setting_gap.is_zero() {
                thread::sleep(self.timing.setting_gap);
            }
            let ok = self.apply(command, value)?;
            if !ok {
                warn!("{} failed, continuing", command);
            }
            acknowledgements.push((command, ok));
        }

        let values = self.collect(settings.duration())?;
        Ok(AcquisitionReport {
            acknowledgements,
            values,
        })
    }

    fn publish(&self, values: Vec<u16>) {
        let count = values.len();
        match self.events.send(values) {
            Ok(receivers) => debug!("Published {} values to {} subscribers", count, receivers),
            Err(_) => debug!("Collected {} values with no subscribers", count),
        }
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        self.uninitialize();
    }
}

/// Returns the session to `Idle` when a collection ends, however it ends
struct CollectingGuard<'a> {
    session: &'a AcquisitionSession,
    generation: u64,
}

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.session.lock();
        if inner.generation == self.generation && inner.state == SessionState::Collecting {
            inner.state = SessionState::Idle;
        }
    }
}
