//! The closed motor parameter set and its per-axis cache.
//!
//! Every vendor exposes some subset of the same logical parameters, so the
//! set is a closed enum rather than stringly-typed names. Values are all
//! `f64`; boolean parameters (closed loop) use 0.0/1.0 like the integer
//! parameters they map to on the wire.

use serde::{Deserialize, Serialize};

/// Logical axis parameters, common to all vendors.
///
/// A vendor that cannot address one of these returns `NotSupported` from
/// `set_parameter` rather than silently succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorParam {
    /// Redefine the current actual position, in engineering units.
    Position,
    /// Controller counts per engineering unit.
    Resolution,
    /// Encoder counts per motor count.
    EncoderRatio,
    /// Low soft travel limit.
    LowLimit,
    /// High soft travel limit.
    HighLimit,
    /// PID proportional gain, controller units.
    ProportionalGain,
    /// PID integral gain, controller units.
    IntegralGain,
    /// PID derivative gain, controller units.
    DerivativeGain,
    /// Closed-loop / motor power enable (0.0 = off, nonzero = on).
    ClosedLoop,
}

impl MotorParam {
    pub const ALL: [MotorParam; 9] = [
        MotorParam::Position,
        MotorParam::Resolution,
        MotorParam::EncoderRatio,
        MotorParam::LowLimit,
        MotorParam::HighLimit,
        MotorParam::ProportionalGain,
        MotorParam::IntegralGain,
        MotorParam::DerivativeGain,
        MotorParam::ClosedLoop,
    ];

    /// Human-readable label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            MotorParam::Position => "position",
            MotorParam::Resolution => "resolution",
            MotorParam::EncoderRatio => "encoder_ratio",
            MotorParam::LowLimit => "low_limit",
            MotorParam::HighLimit => "high_limit",
            MotorParam::ProportionalGain => "p_gain",
            MotorParam::IntegralGain => "i_gain",
            MotorParam::DerivativeGain => "d_gain",
            MotorParam::ClosedLoop => "closed_loop",
        }
    }

    fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|p| *p == self)
            .unwrap_or_default()
    }
}

/// Fixed-size last-known-value cache, one per axis.
///
/// Written by successful `set_parameter` transactions, read by
/// `get_parameter`. A slot that was never written reads back as unset.
#[derive(Debug, Clone, Default)]
pub struct ParamCache {
    values: [Option<f64>; MotorParam::ALL.len()],
}

impl ParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, param: MotorParam) -> Option<f64> {
        self.values[param.index()]
    }

    pub fn set(&mut self, param: MotorParam, value: f64) {
        self.values[param.index()] = Some(value);
    }

    pub fn is_set(&self, param: MotorParam) -> bool {
        self.get(param).is_some()
    }

    /// Cached soft limits, if both have been written.
    pub fn soft_limits(&self) -> Option<(f64, f64)> {
        match (self.get(MotorParam::LowLimit), self.get(MotorParam::HighLimit)) {
            (Some(low), Some(high)) => Some((low, high)),
            _ => None,
        }
    }
}
