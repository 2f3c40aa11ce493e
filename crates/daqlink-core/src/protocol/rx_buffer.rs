//! Receive buffer
//!
//! Bytes arrive on the transport's reader thread and are consumed by the
//! sequencer on the caller's thread. Both sides meet here: one mutex guards
//! the accumulated bytes together with an auto-reset wake flag, and a condvar
//! wakes a single waiter per append.

use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Why a [`RxBuffer::wait`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// New bytes were appended since the last wait
    Signaled,
    /// The timeout elapsed with no append
    TimedOut,
}

#[derive(Default)]
struct State {
    bytes: Vec<u8>,
    signaled: bool,
}

/// Append-only byte accumulator paired with a wake signal
#[derive(Default)]
pub struct RxBuffer {
    state: Mutex<State>,
    wake: Condvar,
}

impl RxBuffer {
    /// Create an empty, unsignaled buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append received bytes and raise the signal. Never blocks beyond the lock.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.lock();
        state.bytes.extend_from_slice(bytes);
        state.signaled = true;
        self.wake.notify_one();
    }

    /// Take everything accumulated so far, leaving the buffer empty
    pub fn drain(&self) -> Vec<u8> {
        mem::take(&mut self.lock().bytes)
    }

    /// Drop accumulated bytes and any pending signal; returns how many bytes were discarded
    pub fn reset(&self) -> usize {
        let mut state = self.lock();
        state.signaled = false;
        let discarded = state.bytes.len();
        state.bytes.clear();
        discarded
    }

    /// Block until signaled or until `timeout` elapses.
    ///
    /// The signal auto-resets: a successful wait consumes it, so the next wait
    /// blocks until another append.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !state.signaled {
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            state = match self.wake.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        state.signaled = false;
        WaitOutcome::Signaled
    }

    /// Number of bytes currently buffered
    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
