//! The vendor profile seam.
//!
//! A [`VendorProfile`] is everything that differs between controller
//! families: wire framing, the discovery handshake, which status queries a
//! poll cycle issues and how their replies decode, and how motion commands
//! are spelled. Everything above this trait — the transaction engine, the
//! poller, the axis dispatcher — is vendor-independent.
//!
//! Profiles are pure string-in/string-out translators. They never touch the
//! transport and hold no mutable state, so a profile can be unit-tested
//! against captured payloads without any I/O.

use motor_core::{DecodeError, Framing, MotorParam, MotorResult, RawAxisStatus};

/// Identity reported by a controller's discovery handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    /// Model designation, e.g. "MM4000".
    pub model: String,
    /// Firmware / version text as reported.
    pub firmware: String,
}

/// Whether one status transaction set covers the whole controller or a
/// single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollScope {
    /// One set of queries returns the state of every axis (comma-separated
    /// group replies). The poller issues the set once per cycle.
    Controller,
    /// Queries address one axis at a time; the poller iterates the axes.
    PerAxis,
}

/// Velocity/acceleration terms for a motion command, already converted to
/// raw controller counts. `None` means the caller asked for the device
/// default and no term is emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedTerms {
    /// Base (starting) velocity, for vendors with a ramp start term.
    pub base_velocity: Option<f64>,
    /// Slew velocity.
    pub velocity: Option<f64>,
    pub acceleration: Option<f64>,
}

/// Outcome of translating a parameter write for a given vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamWrite {
    /// Send this command, then record the value in the axis cache.
    Command(String),
    /// The vendor has no command for it but the value is meaningful
    /// host-side (soft limits enforced by the dispatcher, ratios used in
    /// conversions): record it in the cache only.
    CacheOnly,
    /// The parameter has no meaning for this vendor.
    Unsupported,
}

/// One controller family's protocol, expressed as pure translations.
pub trait VendorProfile: Send + Sync {
    /// Short identifier used in configs and log lines.
    fn name(&self) -> &'static str;

    /// Wire framing for this family.
    fn framing(&self) -> Framing;

    /// Upper bound on addressable axes.
    fn max_axes(&self) -> usize;

    /// Default display name for axis `index` (zero-based).
    fn axis_name(&self, index: usize) -> String {
        (index + 1).to_string()
    }

    /// The identity query sent once at connect time.
    fn discovery_query(&self) -> &'static str;

    /// Parse the discovery reply, rejecting controllers of the wrong family.
    fn parse_discovery(&self, reply: &str) -> Result<ControllerInfo, DecodeError>;

    /// Whether status queries cover the whole controller or one axis.
    fn poll_scope(&self) -> PollScope;

    /// The ordered status queries for one poll transaction set.
    ///
    /// `axis` is `Some` only for [`PollScope::PerAxis`] profiles.
    fn status_queries(&self, axis: Option<usize>) -> Vec<String>;

    /// Decode the replies to [`status_queries`](Self::status_queries) into
    /// the raw status of axis `axis`.
    ///
    /// `replies` has one entry per query, in order. Missing fields, stray
    /// text or an out-of-range axis group are a [`DecodeError`], never a
    /// default value.
    fn decode_status(&self, replies: &[String], axis: usize) -> Result<RawAxisStatus, DecodeError>;

    /// Whether `line` is a bare acknowledgement or command echo that the
    /// transaction engine should skip while waiting for a payload.
    fn is_ack_line(&self, _line: &str) -> bool {
        false
    }

    /// Command string for an absolute or relative move to `target_counts`.
    fn move_command(
        &self,
        axis: usize,
        target_counts: f64,
        relative: bool,
        speed: SpeedTerms,
    ) -> String;

    /// Command string for a home search.
    fn home_command(&self, axis: usize, forwards: bool, speed: SpeedTerms)
        -> MotorResult<String>;

    /// Command string for a constant-velocity jog at `velocity_counts`
    /// (sign is direction).
    ///
    /// `soft_limits` carries the cached travel range in counts for vendors
    /// that can only fake a jog as a move toward a limit.
    fn jog_command(
        &self,
        axis: usize,
        velocity_counts: f64,
        accel_counts: Option<f64>,
        soft_limits: Option<(f64, f64)>,
    ) -> MotorResult<String>;

    /// Command string to stop axis motion. Must be safe to send when the
    /// axis is already at rest.
    fn stop_command(&self, axis: usize, decel_counts: Option<f64>) -> String;

    /// Translate a parameter write. `value_counts` is already in raw
    /// controller counts for position-like parameters.
    fn param_write(&self, axis: usize, param: MotorParam, value_counts: f64) -> ParamWrite;

    /// Whether [`param_write`](Self::param_write) can do anything with
    /// `param` on this vendor.
    fn supports_param(&self, axis: usize, param: MotorParam) -> bool {
        self.param_write(axis, param, 0.0) != ParamWrite::Unsupported
    }
}
