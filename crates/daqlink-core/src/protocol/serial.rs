//! Serial port handling
//!
//! Serial-port [`Transport`] for the acquisition board.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{codec, ReceiveCallback, Transport, TransportError};
use crate::config::EndpointConfig;

/// Read timeout on the reader thread; bounds how long `close` waits for it
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Open a serial port at the endpoint's speed, 8N1 without flow control
pub fn open_port(endpoint: &EndpointConfig) -> Result<Box<dyn SerialPort>, TransportError> {
    serialport::new(&endpoint.port, endpoint.baud_rate)
        .timeout(READ_TIMEOUT)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|e| TransportError::Open {
            port: endpoint.port.clone(),
            reason: e.to_string(),
        })
}

/// Clear both serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), TransportError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| TransportError::Serial(e.to_string()))
}

struct Reader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Serial-port link to the acquisition board.
///
/// Writes happen on the caller's thread; a dedicated reader thread polls the
/// port and hands every received chunk to the receive callback.
#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    reader: Option<Reader>,
}

impl SerialTransport {
    /// Create a transport that is not yet open
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_reader(
        mut port: Box<dyn SerialPort>,
        on_receive: ReceiveCallback,
    ) -> Result<Reader, TransportError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("daqlink-rx".into())
            .spawn(move || {
                let mut buf = [0u8; 1024];
                while !flag.load(Ordering::Relaxed) {
                    match port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => on_receive(&buf[..n]),
                        Err(e) if e.kind() == ErrorKind::TimedOut => {}
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => {
                            warn!("Serial reader stopped: {}", e);
                            break;
                        }
                    }
                }
                debug!("Serial reader exited");
            })?;

        Ok(Reader { stop, handle })
    }
}

impl Transport for SerialTransport {
    fn open(
        &mut self,
        endpoint: &EndpointConfig,
        on_receive: ReceiveCallback,
    ) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let mut port = open_port(endpoint)?;
        clear_buffers(port.as_mut())?;
        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        self.reader = Some(Self::spawn_reader(reader_port, on_receive)?);
        self.port = Some(port);

        info!(
            "Opened serial port {} at {} baud",
            endpoint.port, endpoint.baud_rate
        );
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.write_all(bytes)?;
        port.flush()?;
        debug!("tx {}", codec::to_hex(bytes));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop.store(true, Ordering::Relaxed);
            if reader.handle.join().is_err() {
                warn!("Serial reader thread panicked");
            }
        }
        if let Some(port) = self.port.take() {
            info!("Closed serial port {}", port.name().unwrap_or_default());
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}
