//! Serialized request/response transactions against one controller.
//!
//! The controllers this stack talks to are half-duplex: a second request
//! sent while a reply is pending interleaves the two replies and corrupts
//! both. The [`TransactionEngine`] therefore wraps the transport in an
//! async mutex and exposes whole transactions as the only operations, so a
//! poll cycle and a caller-issued move can never split each other's
//! exchanges.
//!
//! Timeout handling is deliberately asymmetric: the request is written
//! exactly once, and only the read is retried (the reply may just be slow;
//! re-sending the request would queue a second reply behind the first).
//! The retry bound counts total read attempts, so with the default bound of
//! 3 a transaction that times out three times fails, and one that times out
//! twice and then sees the terminator succeeds on its third read.

use std::time::Duration;

use motor_core::{DynSerial, Framing, LineTransport, MotorError, MotorResult, TransportError};
use tokio::sync::Mutex;

/// Tunables for one controller's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSettings {
    /// Timeout for each individual read attempt.
    pub reply_timeout: Duration,
    /// Total read attempts per transaction (and the budget for skipped
    /// acknowledgement lines). Must be at least 1.
    pub max_read_attempts: u32,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(1),
            max_read_attempts: 3,
        }
    }
}

/// Owns the line transport for one controller and serializes access to it.
pub struct TransactionEngine {
    transport: Mutex<LineTransport>,
    settings: TransactionSettings,
}

impl TransactionEngine {
    pub fn new(port: DynSerial, framing: Framing) -> Self {
        Self::with_settings(port, framing, TransactionSettings::default())
    }

    pub fn with_settings(port: DynSerial, framing: Framing, settings: TransactionSettings) -> Self {
        Self {
            transport: Mutex::new(LineTransport::new(port, framing)),
            settings,
        }
    }

    pub fn settings(&self) -> TransactionSettings {
        self.settings
    }

    /// One query transaction: write the request once, read one reply line.
    pub async fn transact(&self, request: &str) -> MotorResult<String> {
        self.transact_filtered(request, |_| false).await
    }

    /// Like [`transact`](Self::transact), but lines matched by `is_ack`
    /// (command echoes, bare acknowledgements) are skipped while waiting
    /// for the payload line. Skips draw from the same attempt budget, so a
    /// device that only ever acknowledges cannot stall the engine.
    pub async fn transact_filtered<F>(&self, request: &str, is_ack: F) -> MotorResult<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut transport = self.transport.lock().await;
        transport.write_request(request).await.map_err(link_error)?;

        let mut attempts = 0u32;
        let mut skipped = 0u32;
        loop {
            attempts += 1;
            match transport.read_reply(self.settings.reply_timeout).await {
                Ok(line) => {
                    if is_ack(&line) {
                        if skipped < self.settings.max_read_attempts {
                            skipped += 1;
                            tracing::trace!(
                                target: "motor::transaction",
                                request,
                                line = %line,
                                "skipping acknowledgement line"
                            );
                            continue;
                        }
                        return Err(MotorError::MalformedReply(format!(
                            "no payload after {} acknowledgement line(s) to '{}'",
                            skipped, request
                        )));
                    }
                    return Ok(line);
                }
                Err(TransportError::Timeout(_)) => {
                    if attempts < self.settings.max_read_attempts {
                        tracing::debug!(
                            target: "motor::transaction",
                            request,
                            attempt = attempts,
                            "reply read timed out, retrying read"
                        );
                        continue;
                    }
                    return Err(MotorError::Timeout { attempts });
                }
                Err(err) => return Err(link_error(err)),
            }
        }
    }

    /// Fire-and-forget command transaction: write the request, expect no
    /// reply line.
    pub async fn send(&self, request: &str) -> MotorResult<()> {
        let mut transport = self.transport.lock().await;
        transport.write_request(request).await.map_err(link_error)
    }

    /// Discard stale bytes before a handshake.
    pub async fn drain(&self, window: Duration) -> usize {
        self.transport.lock().await.drain(window).await
    }
}

fn link_error(err: TransportError) -> MotorError {
    match err {
        TransportError::Timeout(t) => MotorError::Link(format!("write stalled for {:?}", t)),
        other => MotorError::Link(other.to_string()),
    }
}
