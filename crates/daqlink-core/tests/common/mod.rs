//! Scripted in-memory transport shared by the integration tests

#![allow(dead_code)]

use daqlink_core::config::EndpointConfig;
use daqlink_core::protocol::{
    Command, ReceiveCallback, Transport, TransportError, ACK, DATA_HEAD, DATA_TAIL,
};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Bytes the mock board sends back `after` the triggering write
pub type Reply = (Duration, Vec<u8>);

type Responder = Box<dyn FnMut(u16, i32) -> Vec<Reply> + Send>;

/// State shared between a `MockTransport` and the test driving it
pub struct MockLink {
    callback: Mutex<Option<Arc<ReceiveCallback>>>,
    writes: Mutex<Vec<(Instant, Vec<u8>)>>,
    responder: Mutex<Responder>,
    open: AtomicBool,
    refuse_open: AtomicBool,
    fail_writes: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl MockLink {
    fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(|_, _| Vec::new())),
            open: AtomicBool::new(false),
            refuse_open: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Replace how the board answers each written frame
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(u16, i32) -> Vec<Reply> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Box::new(responder);
    }

    /// Acknowledge every setting command after `delay`
    pub fn ack_settings(&self, delay: Duration) {
        self.respond_with(move |opcode, _| match Command::from_opcode(opcode) {
            Some(cmd) if cmd.is_setting() => vec![(delay, ACK.to_vec())],
            _ => Vec::new(),
        });
    }

    /// Acknowledge settings and answer `StartCollect` with the given data frames
    pub fn board(&self, ack_delay: Duration, frames: Vec<Reply>) {
        self.respond_with(move |opcode, _| match Command::from_opcode(opcode) {
            Some(Command::StartCollect) => frames.clone(),
            Some(cmd) if cmd.is_setting() => vec![(ack_delay, ACK.to_vec())],
            _ => Vec::new(),
        });
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Every frame written so far, with the instant it was written
    pub fn writes(&self) -> Vec<(Instant, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Push bytes as if the board had sent them unprompted
    pub fn inject(&self, bytes: &[u8]) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(cb) = callback {
            (*cb)(bytes);
        }
    }

    fn deliver_later(self: &Arc<Self>, written_at: Instant, replies: Vec<Reply>) {
        if replies.is_empty() {
            return;
        }
        let link = Arc::clone(self);
        thread::spawn(move || {
            for (after, bytes) in replies {
                let due = written_at + after;
                let now = Instant::now();
                if due > now {
                    thread::sleep(due - now);
                }
                if !link.is_open() {
                    return;
                }
                link.inject(&bytes);
            }
        });
    }
}

/// `Transport` backed by a [`MockLink`]
pub struct MockTransport {
    link: Arc<MockLink>,
}

impl MockTransport {
    pub fn new() -> (Self, Arc<MockLink>) {
        let link = Arc::new(MockLink::new());
        (
            Self {
                link: Arc::clone(&link),
            },
            link,
        )
    }
}

impl Transport for MockTransport {
    fn open(
        &mut self,
        endpoint: &EndpointConfig,
        on_receive: ReceiveCallback,
    ) -> Result<(), TransportError> {
        if self.link.refuse_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open {
                port: endpoint.port.clone(),
                reason: "port is busy".into(),
            });
        }
        if self.link.is_open() {
            return Err(TransportError::AlreadyOpen);
        }
        *self.link.callback.lock().unwrap() = Some(Arc::new(on_receive));
        self.link.open.store(true, Ordering::SeqCst);
        self.link.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.link.is_open() {
            return Err(TransportError::NotOpen);
        }
        if self.link.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }

        let written_at = Instant::now();
        self.link
            .writes
            .lock()
            .unwrap()
            .push((written_at, bytes.to_vec()));

        let (opcode, parameter) = daqlink_core::protocol::codec::decode(bytes)
            .expect("sequencer always writes whole frames");
        let replies = {
            let mut responder = self.link.responder.lock().unwrap();
            (*responder)(opcode, parameter)
        };
        self.link.deliver_later(written_at, replies);
        Ok(())
    }

    fn close(&mut self) {
        if self.link.open.swap(false, Ordering::SeqCst) {
            self.link.closes.fetch_add(1, Ordering::SeqCst);
        }
        *self.link.callback.lock().unwrap() = None;
    }

    fn is_open(&self) -> bool {
        self.link.is_open()
    }
}

/// A complete data frame carrying `values`
pub fn data_frame(values: &[u16]) -> Vec<u8> {
    let mut bytes = DATA_HEAD.to_vec();
    for v in values {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    bytes.extend_from_slice(&DATA_TAIL);
    bytes
}

pub fn endpoint() -> EndpointConfig {
    EndpointConfig::new("/dev/ttyMOCK0", 115200)
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
