//! Line-framed transport over an async byte stream.
//!
//! One [`LineTransport`] owns one bidirectional connection to one motor
//! controller and provides the blocking "write request, read response"
//! primitive everything above it is built on. Requests and replies are
//! ASCII lines terminated by a configured end-of-string (EOS) character;
//! the controllers themselves are effectively half-duplex, so there is
//! never more than one exchange in flight.
//!
//! # Types
//!
//! - [`SerialPortIO`]: trait alias combining AsyncRead + AsyncWrite
//! - [`DynSerial`]: type-erased boxed byte stream
//! - [`Framing`]: the EOS pair a vendor protocol uses
//! - [`LineTransport`]: the framed write/read primitive
//!
//! Any `AsyncRead + AsyncWrite` stream works: `tokio_serial::SerialStream`
//! for RS-232 hardware, `tokio::net::TcpStream` for ethernet controllers,
//! `tokio::io::duplex` or a scripted mock port in tests.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::MotorError;

/// Trait alias for the async byte streams a transport can sit on.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed byte stream.
pub type DynSerial = Box<dyn SerialPortIO>;

/// End-of-string framing for one vendor protocol.
///
/// `output_eos` is appended to every request; `input_eos` terminates every
/// reply line. They frequently differ from each other (several controllers
/// accept bare CR commands but reply with CR/LF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Terminator appended to outgoing requests.
    pub output_eos: &'static str,
    /// Byte that ends an incoming reply line.
    pub input_eos: u8,
}

impl Framing {
    /// CR-terminated requests, CR-terminated replies.
    pub const CR: Framing = Framing {
        output_eos: "\r",
        input_eos: b'\r',
    };

    /// CR/LF both ways; the reply is read up to the LF and trimmed.
    pub const CRLF: Framing = Framing {
        output_eos: "\r\n",
        input_eos: b'\n',
    };

    /// LF both ways.
    pub const LF: Framing = Framing {
        output_eos: "\n",
        input_eos: b'\n',
    };
}

/// Failure modes of a single framed exchange.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No reply terminator was seen within the timeout.
    #[error("no reply terminator within {0:?}")]
    Timeout(Duration),

    /// The request was not transferred in full. There is no partial-write
    /// retry: the exchange fails immediately.
    #[error("short write: {written} of {expected} bytes transferred")]
    ShortWrite { written: usize, expected: usize },

    /// Connection-level fault (reset, closed, I/O error).
    #[error("link error: {0}")]
    Link(String),
}

impl From<TransportError> for MotorError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => MotorError::Timeout { attempts: 1 },
            other => MotorError::Link(other.to_string()),
        }
    }
}

/// Line-oriented transport over one controller connection.
///
/// The reader side is buffered so replies can be accumulated up to the EOS
/// byte; writes go straight to the underlying stream.
pub struct LineTransport {
    io: BufReader<DynSerial>,
    framing: Framing,
}

impl LineTransport {
    pub fn new(port: DynSerial, framing: Framing) -> Self {
        Self {
            io: BufReader::new(port),
            framing,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Write one framed request.
    ///
    /// The whole request (including the EOS) must transfer in a single
    /// write; anything less is a [`TransportError::ShortWrite`].
    pub async fn write_request(&mut self, request: &str) -> Result<(), TransportError> {
        let mut frame = String::with_capacity(request.len() + self.framing.output_eos.len());
        frame.push_str(request);
        frame.push_str(self.framing.output_eos);
        let bytes = frame.as_bytes();

        let writer = self.io.get_mut();
        let written = writer
            .write(bytes)
            .await
            .map_err(|e| TransportError::Link(e.to_string()))?;
        if written != bytes.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        writer
            .flush()
            .await
            .map_err(|e| TransportError::Link(e.to_string()))?;
        Ok(())
    }

    /// Read one reply line, waiting at most `timeout` for the terminator.
    ///
    /// This is a separate entry point from [`write_read`](Self::write_read)
    /// so the transaction engine can retry the read alone after a timeout,
    /// without re-sending the request.
    pub async fn read_reply(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        let read = tokio::time::timeout(timeout, self.io.read_until(self.framing.input_eos, &mut buf));
        match read.await {
            Err(_) => Err(TransportError::Timeout(timeout)),
            Ok(Err(e)) => Err(TransportError::Link(e.to_string())),
            Ok(Ok(0)) => Err(TransportError::Link("connection closed".to_string())),
            Ok(Ok(_)) => {
                if buf.last() == Some(&self.framing.input_eos) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf);
                Ok(line.trim_end_matches(['\r', '\n']).to_string())
            }
        }
    }

    /// One full request/response exchange.
    pub async fn write_read(
        &mut self,
        request: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.write_request(request).await?;
        self.read_reply(timeout).await
    }

    /// Discard any stale reply bytes sitting in the receive path.
    ///
    /// Used before a discovery handshake, where a previous process may have
    /// left half a reply in the controller's output queue.
    pub async fn drain(&mut self, window: Duration) -> usize {
        let mut discard = [0u8; 256];
        let deadline = tokio::time::Instant::now() + window;
        let mut total = 0usize;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.io.read(&mut discard)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => total += n,
                Ok(Err(_)) => break,
                Err(_) => break,
            }
        }
        if total > 0 {
            tracing::debug!(target: "motor::transport", bytes = total, "drained stale input");
        }
        total
    }
}

/// Open a serial port asynchronously with the standard 8N1 settings.
///
/// Wrapped in `spawn_blocking` so port initialization cannot stall the
/// runtime.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<DynSerial> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    let stream = spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")??;

    Ok(Box::new(stream))
}

/// Connect to a TCP-attached controller.
pub async fn connect_tcp(addr: &str, device_name: &str) -> anyhow::Result<DynSerial> {
    use anyhow::Context;

    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .context(format!("Failed to connect {} at {}", device_name, addr))?;
    stream.set_nodelay(true)?;
    Ok(Box::new(stream))
}
