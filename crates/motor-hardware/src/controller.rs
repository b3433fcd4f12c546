//! One connected motor controller.
//!
//! A [`Controller`] ties together a vendor profile, the transaction engine
//! for its connection, and its set of axes. Construction performs the
//! discovery handshake (drain stale bytes, identity query with bounded
//! retries, reject the wrong controller family) so a `Controller` that
//! exists is one that answered as the expected hardware.
//!
//! The background poller is started explicitly with
//! [`start_poller`](Controller::start_poller); tests that script the wire
//! byte-for-byte construct the controller without it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use motor_core::{retry::with_retry, DynSerial, MotorError, RetryPolicy};
use tokio::sync::Notify;

use crate::axis::{Axis, AxisConfig, AxisId};
use crate::poller;
use crate::profile::{ControllerInfo, VendorProfile};
use crate::transaction::{TransactionEngine, TransactionSettings};

const DRAIN_WINDOW: Duration = Duration::from_millis(50);

/// Poll-loop tunables for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Cycle period while any axis is moving (or a fast burst is forced).
    pub moving_period: Duration,
    /// Cycle period while every axis is at rest. Zero disables periodic
    /// idle polling: the loop then waits for a wake signal.
    pub idle_period: Duration,
    /// Fast cycles forced after every command dispatch, covering the gap
    /// before the controller starts reporting the motion.
    pub forced_fast_polls: u32,
    /// Consecutive at-rest polls required before a previously-moving axis
    /// is reported done. 1 reports done on the first at-rest poll.
    pub done_debounce: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            moving_period: Duration::from_millis(100),
            idle_period: Duration::from_secs(1),
            forced_fast_polls: 10,
            done_debounce: 1,
        }
    }
}

/// A connected, identity-verified motor controller and its axes.
pub struct Controller {
    id: u32,
    profile: Arc<dyn VendorProfile>,
    engine: TransactionEngine,
    axes: Vec<Arc<Axis>>,
    settings: PollSettings,
    info: ControllerInfo,
    wake: Notify,
}

impl Controller {
    /// Perform the discovery handshake and build the controller.
    ///
    /// Fails if the device never answers the identity query (after the
    /// standard bounded retries) or answers as a different family, or if
    /// the axis list is empty or exceeds the profile's addressable range.
    pub async fn connect(
        id: u32,
        profile: Arc<dyn VendorProfile>,
        port: DynSerial,
        axes: Vec<AxisConfig>,
        settings: PollSettings,
    ) -> anyhow::Result<Arc<Self>> {
        Self::connect_with(
            id,
            profile,
            port,
            axes,
            settings,
            TransactionSettings::default(),
        )
        .await
    }

    pub async fn connect_with(
        id: u32,
        profile: Arc<dyn VendorProfile>,
        port: DynSerial,
        axes: Vec<AxisConfig>,
        settings: PollSettings,
        transaction: TransactionSettings,
    ) -> anyhow::Result<Arc<Self>> {
        if axes.is_empty() {
            bail!("controller {} configured with no axes", id);
        }
        for (index, axis) in axes.iter().enumerate() {
            let ups = axis.conversion.units_per_step;
            if !ups.is_finite() || ups == 0.0 {
                bail!(
                    "controller {} axis {}: units_per_step must be finite and nonzero, got {}",
                    id,
                    index,
                    ups
                );
            }
        }
        if axes.len() > profile.max_axes() {
            bail!(
                "controller {} configured with {} axes; {} addresses at most {}",
                id,
                axes.len(),
                profile.name(),
                profile.max_axes()
            );
        }

        let engine = TransactionEngine::with_settings(port, profile.framing(), transaction);
        engine.drain(DRAIN_WINDOW).await;

        let info = discover(&engine, profile.as_ref())
            .await
            .with_context(|| format!("controller {} discovery failed", id))?;
        tracing::info!(
            target: "motor::controller",
            controller = id,
            profile = profile.name(),
            model = %info.model,
            firmware = %info.firmware,
            axes = axes.len(),
            "controller connected"
        );

        let axes = axes
            .into_iter()
            .enumerate()
            .map(|(index, config)| {
                Axis::new(
                    AxisId {
                        controller: id,
                        index,
                    },
                    config,
                )
            })
            .collect();

        Ok(Arc::new(Self {
            id,
            profile,
            engine,
            axes,
            settings,
            info,
            wake: Notify::new(),
        }))
    }

    /// Spawn the background status poller for this controller.
    pub fn start_poller(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(poller::run(controller));
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.info
    }

    pub fn profile(&self) -> &Arc<dyn VendorProfile> {
        &self.profile
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.settings
    }

    pub(crate) fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    pub fn axes(&self) -> &[Arc<Axis>] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&Arc<Axis>> {
        self.axes.get(index)
    }

    /// Wake the poller for an immediate cycle and a forced fast burst.
    /// Called after every dispatched command; also the caller-facing
    /// "refresh now" hook.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) fn wake_signal(&self) -> &Notify {
        &self.wake
    }

    /// Human-readable state dump: identity plus one line per axis.
    pub async fn report(&self) -> String {
        use std::fmt::Write;

        let mut out = format!(
            "controller {} [{}]: model={} firmware={}\n",
            self.id,
            self.profile.name(),
            self.info.model,
            self.info.firmware
        );
        for axis in &self.axes {
            let snap = axis.snapshot().await;
            // Ignoring fmt::Write errors: writing to String cannot fail.
            let _ = writeln!(
                out,
                "  axis {} ({}): pos={:.4} moving={} done={} limits={}/{} homed={} fault={} comm_error={}",
                axis.id().index,
                axis.config().name,
                snap.position,
                snap.moving,
                snap.done,
                snap.low_limit,
                snap.high_limit,
                snap.homed,
                snap.fault,
                snap.comm_error
            );
        }
        out
    }
}

/// Identity handshake: query, parse, retry on communication failure.
async fn discover(
    engine: &TransactionEngine,
    profile: &dyn VendorProfile,
) -> Result<ControllerInfo, MotorError> {
    let policy = RetryPolicy::default();
    with_retry(&policy, "controller discovery", || async {
        let reply = engine
            .transact_filtered(profile.discovery_query(), |l| profile.is_ack_line(l))
            .await?;
        profile
            .parse_discovery(&reply)
            .map_err(|e| MotorError::MalformedReply(e.to_string()))
    })
    .await
}
