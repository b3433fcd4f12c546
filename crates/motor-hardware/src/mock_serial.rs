//! In-memory serial port for controller tests.
//!
//! [`MockSerialPort`] implements `AsyncRead`/`AsyncWrite` over a pair of
//! unbounded channels and stands in for a real port anywhere a `DynSerial`
//! is expected. The matching [`MockDeviceHarness`] stays in the test and
//! plays the controller: it can assert on written requests byte-for-byte,
//! inject replies, or run a scripted request handler with
//! [`serve`](MockDeviceHarness::serve).
//!
//! Timeout behavior falls out naturally: a request the harness never
//! answers leaves the port's read side pending, which is exactly what a
//! silent controller looks like to the transport.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// The port side, handed to the code under test.
#[derive(Debug)]
pub struct MockSerialPort {
    writes_tx: UnboundedSender<Vec<u8>>,
    reads_rx: UnboundedReceiver<Vec<u8>>,
    read_buffer: VecDeque<u8>,
}

/// The device side, kept by the test.
#[derive(Debug)]
pub struct MockDeviceHarness {
    writes_rx: UnboundedReceiver<Vec<u8>>,
    reads_tx: UnboundedSender<Vec<u8>>,
    write_buffer: Vec<u8>,
}

/// A connected port/harness pair.
pub fn new() -> (MockSerialPort, MockDeviceHarness) {
    let (writes_tx, writes_rx) = mpsc::unbounded_channel();
    let (reads_tx, reads_rx) = mpsc::unbounded_channel();

    (
        MockSerialPort {
            writes_tx,
            reads_rx,
            read_buffer: VecDeque::new(),
        },
        MockDeviceHarness {
            writes_rx,
            reads_tx,
            write_buffer: Vec::new(),
        },
    )
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.read_buffer.is_empty() {
            match self.reads_rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.read_buffer.extend(chunk),
                // Harness dropped: end-of-file.
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        let to_read = std::cmp::min(buf.remaining(), self.read_buffer.len());
        let chunk: Vec<u8> = self.read_buffer.drain(..to_read).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes_tx.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device harness disconnected",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MockDeviceHarness {
    /// Inject reply bytes for the port to read.
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        self.reads_tx
            .send(data.to_vec())
            .map_err(|_| "client port disconnected")
    }

    /// Wait for the port side to write exactly `expected`, panicking on a
    /// mismatch or after two seconds of silence. Excess bytes stay
    /// buffered for the next expectation.
    pub async fn expect_write(&mut self, expected: &[u8]) {
        use tokio::time::{timeout, Duration};

        while self.write_buffer.len() < expected.len() {
            match timeout(Duration::from_secs(2), self.writes_rx.recv()).await {
                Ok(Some(chunk)) => self.write_buffer.extend_from_slice(&chunk),
                Ok(None) => panic!("port closed while expecting a write"),
                Err(_) => panic!(
                    "timeout waiting for write: expected `{}`, have `{}`",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&self.write_buffer)
                ),
            }
        }

        let actual = &self.write_buffer[..expected.len()];
        assert_eq!(
            actual,
            expected,
            "unexpected write: expected `{}`, got `{}`",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        );
        self.write_buffer.drain(..expected.len());
    }

    /// Expect a request and answer it in one step.
    pub async fn expect_and_respond(&mut self, expected: &[u8], response: &[u8]) {
        self.expect_write(expected).await;
        self.send_response(response)
            .unwrap_or_else(|e| panic!("{}", e));
    }

    /// Turn the harness into a scripted device.
    ///
    /// Incoming bytes are split into requests on `eos`; each request line
    /// (terminator stripped) is passed to `handler`, and every returned
    /// line is sent back with `eos` appended. Returning no lines models a
    /// fire-and-forget command (or a device that stays silent). The task
    /// ends when the port side is dropped.
    pub fn serve<F>(mut self, eos: &'static str, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut pending: Vec<u8> = Vec::new();
            while let Some(chunk) = self.writes_rx.recv().await {
                pending.extend_from_slice(&chunk);
                while let Some(pos) = find_subslice(&pending, eos.as_bytes()) {
                    let request: Vec<u8> = pending.drain(..pos + eos.len()).collect();
                    let line = String::from_utf8_lossy(&request[..pos]).into_owned();
                    for reply in handler(&line) {
                        let mut framed = reply.into_bytes();
                        framed.extend_from_slice(eos.as_bytes());
                        if self.reads_tx.send(framed).is_err() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
