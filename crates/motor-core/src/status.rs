//! Generic axis status model and the pure decode refinement step.
//!
//! Vendor profiles parse their wire payloads into a [`RawAxisStatus`]: the
//! handful of named bits and raw numbers a controller actually reports.
//! [`refine`] then turns that into the portable [`AxisSnapshot`] consumers
//! see, applying the per-axis polarity corrections and unit conversion.
//! Both steps are pure functions with no I/O, which is what makes the
//! decoder testable against synthetic payloads.
//!
//! Two decisions live here deliberately:
//!
//! - "moving" is the union of the vendor's explicit busy bit and a
//!   currently-nonzero velocity. Controllers disagree about which signal
//!   is authoritative; the union is the conservative reading.
//! - A payload that does not carry any motion signal at all is refused by
//!   the profile as [`DecodeError::Malformed`] rather than decoded. A
//!   truncated reply must never be mistaken for an axis at rest.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised by a vendor profile when a status payload cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Required fields were absent or unparseable. The poller treats this
    /// exactly like a transport failure: `comm_error` is set and the
    /// previous snapshot fields are kept.
    #[error("malformed status payload: {0}")]
    Malformed(String),
}

/// Per-axis conversion and polarity configuration, fixed at setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConversion {
    /// Engineering units per raw controller count.
    pub units_per_step: f64,
    /// Whether the axis has a physical encoder.
    pub has_encoder: bool,
    /// Invert the reported hard-limit switches.
    pub limit_invert: bool,
    /// Invert the reported motion direction.
    pub reverse_direction: bool,
}

impl Default for AxisConversion {
    fn default() -> Self {
        Self {
            units_per_step: 1.0,
            has_encoder: false,
            limit_invert: false,
            reverse_direction: false,
        }
    }
}

/// What one vendor status payload actually said about one axis, before any
/// polarity or unit correction.
///
/// `busy` and `velocity_counts` are optional because vendors differ in
/// which motion signal they report; a profile must supply at least one of
/// them (a payload with neither is malformed by contract).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawAxisStatus {
    /// Explicit in-motion indicator, if the vendor has one.
    pub busy: Option<bool>,
    /// Home switch / homed indicator.
    pub homed: bool,
    /// Plus travel limit, as reported (uncorrected).
    pub high_limit: bool,
    /// Minus travel limit, as reported (uncorrected).
    pub low_limit: bool,
    /// Last motion direction, as reported (true = plus).
    pub direction_positive: bool,
    /// In-band fault indicator (controller error, following error, ...).
    pub fault: bool,
    /// Motor power / servo enabled.
    pub power_on: bool,
    /// Position in raw controller counts.
    pub position_counts: f64,
    /// Encoder position in raw counts, if reported separately.
    pub encoder_counts: Option<f64>,
    /// Velocity in raw counts per second, if reported.
    pub velocity_counts: Option<f64>,
}

/// The portable status/position record for one axis, as of one poll cycle.
///
/// Snapshots are immutable values: the poller builds a new one each cycle
/// and swaps it in under the axis lock, so readers never observe a
/// half-updated record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSnapshot {
    /// Axis is in motion (busy bit or nonzero velocity).
    pub moving: bool,
    /// Canonical "motion complete" flag consumed by callers.
    pub done: bool,
    /// Home signal is active.
    pub homed: bool,
    /// Plus hard limit, after polarity correction.
    pub high_limit: bool,
    /// Minus hard limit, after polarity correction.
    pub low_limit: bool,
    /// Last motion direction, after polarity correction.
    pub direction_positive: bool,
    /// Vendor-reported fault condition (distinct from `comm_error`).
    pub fault: bool,
    /// Motor power / closed loop is on.
    pub power_on: bool,
    /// The last transaction with the controller failed at the transport or
    /// framing level. Sticky: cleared only by the next successful decode.
    pub comm_error: bool,
    /// Position in engineering units.
    pub position: f64,
    /// Encoder position in engineering units (mirrors `position` when the
    /// controller reports no separate encoder).
    pub encoder_position: f64,
    /// Velocity in engineering units per second (0.0 when unreported).
    pub velocity: f64,
}

impl Default for AxisSnapshot {
    /// The state of an axis nobody has polled or moved yet: at rest, no
    /// faults, position zero.
    fn default() -> Self {
        Self {
            moving: false,
            done: true,
            homed: false,
            high_limit: false,
            low_limit: false,
            direction_positive: true,
            fault: false,
            power_on: true,
            comm_error: false,
            position: 0.0,
            encoder_position: 0.0,
            velocity: 0.0,
        }
    }
}

impl AxisSnapshot {
    /// Whether a consumer notification is warranted relative to `prev`.
    pub fn differs_from(&self, prev: &AxisSnapshot) -> bool {
        self != prev
    }
}

/// Refine a decoded vendor payload into a portable snapshot.
///
/// Pure function: polarity XOR for the limit switches and direction, unit
/// conversion via `units_per_step`, and the busy-OR-velocity union for the
/// moving flag. `comm_error` is always false here; only the poller sets it.
pub fn refine(raw: &RawAxisStatus, cfg: &AxisConversion) -> AxisSnapshot {
    let moving = raw.busy.unwrap_or(false)
        || raw.velocity_counts.map_or(false, |v| v != 0.0);
    let position = raw.position_counts * cfg.units_per_step;
    let encoder_position = raw.encoder_counts.unwrap_or(raw.position_counts) * cfg.units_per_step;

    AxisSnapshot {
        moving,
        done: !moving,
        homed: raw.homed,
        high_limit: raw.high_limit ^ cfg.limit_invert,
        low_limit: raw.low_limit ^ cfg.limit_invert,
        direction_positive: raw.direction_positive ^ cfg.reverse_direction,
        fault: raw.fault,
        power_on: raw.power_on,
        comm_error: false,
        position,
        encoder_position,
        velocity: raw.velocity_counts.unwrap_or(0.0) * cfg.units_per_step,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_at(position: f64) -> RawAxisStatus {
        RawAxisStatus {
            busy: Some(false),
            position_counts: position,
            power_on: true,
            ..Default::default()
        }
    }

    #[test]
    fn refine_converts_counts_to_units() {
        let cfg = AxisConversion {
            units_per_step: 0.001,
            ..Default::default()
        };
        let snap = refine(&raw_at(12345.0), &cfg);
        assert_eq!(snap.position, 12.345);
        assert_eq!(snap.encoder_position, 12.345);
        assert!(snap.done);
    }

    #[test]
    fn refine_is_deterministic() {
        let cfg = AxisConversion::default();
        let raw = RawAxisStatus {
            busy: Some(true),
            high_limit: true,
            position_counts: -42.0,
            velocity_counts: Some(100.0),
            ..Default::default()
        };
        assert_eq!(refine(&raw, &cfg), refine(&raw, &cfg));
    }

    #[test]
    fn limit_invert_flips_exactly_the_limit_fields() {
        let cfg = AxisConversion::default();
        let inverted = AxisConversion {
            limit_invert: true,
            ..cfg
        };
        let raw = RawAxisStatus {
            busy: Some(false),
            high_limit: true,
            low_limit: false,
            position_counts: 7.0,
            ..Default::default()
        };

        let plain = refine(&raw, &cfg);
        let flipped = refine(&raw, &inverted);

        assert_eq!(flipped.high_limit, !plain.high_limit);
        assert_eq!(flipped.low_limit, !plain.low_limit);
        // Nothing else moves.
        let normalized = AxisSnapshot {
            high_limit: plain.high_limit,
            low_limit: plain.low_limit,
            ..flipped
        };
        assert_eq!(normalized, plain);
    }

    #[test]
    fn moving_is_union_of_busy_and_velocity() {
        let cfg = AxisConversion::default();

        let by_bit = RawAxisStatus {
            busy: Some(true),
            velocity_counts: Some(0.0),
            ..Default::default()
        };
        assert!(refine(&by_bit, &cfg).moving);

        let by_velocity = RawAxisStatus {
            busy: Some(false),
            velocity_counts: Some(250.0),
            ..Default::default()
        };
        assert!(refine(&by_velocity, &cfg).moving);

        let at_rest = RawAxisStatus {
            busy: Some(false),
            velocity_counts: Some(0.0),
            ..Default::default()
        };
        let snap = refine(&at_rest, &cfg);
        assert!(!snap.moving);
        assert!(snap.done);
    }

    #[test]
    fn reverse_direction_flips_direction_only() {
        let cfg = AxisConversion {
            reverse_direction: true,
            ..Default::default()
        };
        let raw = RawAxisStatus {
            busy: Some(false),
            direction_positive: true,
            ..Default::default()
        };
        let snap = refine(&raw, &cfg);
        assert!(!snap.direction_positive);
        assert!(!snap.high_limit && !snap.low_limit);
    }
}
