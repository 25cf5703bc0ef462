use pedal_protocol::{PedalFrame, StatusFrame};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const BAUD_RATE: u32 = 115_200;
/// A stalled controller must not hang the loop; a timed-out read is reported
/// as "no new frame".
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
const REOPEN_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("serial port open failed: {0}")]
    Open(#[from] serialport::Error),
    #[error("serial i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("pedal frame decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("serial stream closed")]
    Closed,
}

/// Line-framed JSON over the controller's serial link. Generic over the byte
/// stream; production uses a `serialport` handle.
pub struct HardwareBridge<S> {
    stream: S,
    buf: Vec<u8>,
}

impl HardwareBridge<Box<dyn SerialPort>> {
    /// Opens the controller port at the firmware's fixed line settings
    /// (115200 baud, 8-N-1).
    pub fn open(path: &str) -> Result<Self, HardwareError> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(Self::new(port))
    }

    /// Polls until the port opens. Used at startup and again after any
    /// mid-session i/o failure; engine and navigation state survive the
    /// reopen untouched.
    pub fn open_retry(path: &str) -> Self {
        loop {
            match Self::open(path) {
                Ok(bridge) => return bridge,
                Err(e) => {
                    warn!(error = %e, path, "pedal controller not reachable; retrying");
                    thread::sleep(REOPEN_BACKOFF);
                }
            }
        }
    }
}

impl<S: Read + Write> HardwareBridge<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Reads serial lines until one starts with `{` and decodes it. A read
    /// timeout yields `Ok(None)` ("no new frame"); i/o and decode failures
    /// are reported so the caller can reopen the port.
    pub fn read_frame(&mut self) -> Result<Option<PedalFrame>, HardwareError> {
        loop {
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if line.first() != Some(&b'{') {
                    debug!(
                        line = %String::from_utf8_lossy(&line),
                        "skipping non-frame serial line"
                    );
                    continue;
                }
                let frame = serde_json::from_slice(&line)?;
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; 512];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(HardwareError::Closed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Writes one status frame as a newline-terminated JSON line, symmetric
    /// with the inbound framing.
    pub fn write_status(&mut self, status: &StatusFrame) -> Result<(), HardwareError> {
        let mut line = serde_json::to_vec(status)?;
        line.push(b'\n');
        self.stream.write_all(&line)?;
        self.stream.flush()?;
        Ok(())
    }
}
