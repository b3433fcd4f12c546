//! PI E-816 piezo controller profile.
//!
//! GCS-style ASCII, lettered channels (A-D), one query per value. Status
//! is axis-scoped: each poll issues `ONT?`, `OVF?`, `SVO?` and `POS?` for
//! one channel. Piezo stages have no home switch and no jog mode; an
//! on-target axis counts as homed, and a servo overflow is reported as a
//! fault against the plus limit.

use motor_core::{DecodeError, Framing, MotorError, MotorParam, MotorResult, RawAxisStatus};

use crate::profile::{ControllerInfo, ParamWrite, PollScope, SpeedTerms, VendorProfile};

const CHANNELS: [char; 4] = ['A', 'B', 'C', 'D'];

#[derive(Debug, Default)]
pub struct E816;

impl E816 {
    fn channel(axis: usize) -> char {
        CHANNELS.get(axis).copied().unwrap_or('?')
    }
}

impl VendorProfile for E816 {
    fn name(&self) -> &'static str {
        "e816"
    }

    fn framing(&self) -> Framing {
        Framing::LF
    }

    fn max_axes(&self) -> usize {
        CHANNELS.len()
    }

    fn axis_name(&self, index: usize) -> String {
        Self::channel(index).to_string()
    }

    fn discovery_query(&self) -> &'static str {
        "*IDN?"
    }

    fn parse_discovery(&self, reply: &str) -> Result<ControllerInfo, DecodeError> {
        if !reply.contains("E-816") {
            return Err(DecodeError::Malformed(format!(
                "not an E-816 identity: '{}'",
                reply
            )));
        }
        // "(c)2004 PI GmbH, E-816, 0, 2.30" style: the last field is the
        // firmware revision.
        let firmware = reply.rsplit(',').next().map(str::trim).unwrap_or(reply);
        Ok(ControllerInfo {
            model: "E-816".to_string(),
            firmware: firmware.to_string(),
        })
    }

    fn poll_scope(&self) -> PollScope {
        PollScope::PerAxis
    }

    fn status_queries(&self, axis: Option<usize>) -> Vec<String> {
        let channel = Self::channel(axis.unwrap_or(0));
        vec![
            format!("ONT? {}", channel),
            format!("OVF? {}", channel),
            format!("SVO? {}", channel),
            format!("POS? {}", channel),
        ]
    }

    fn decode_status(&self, replies: &[String], axis: usize) -> Result<RawAxisStatus, DecodeError> {
        let [on_target, overflow, servo, position] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 4 status replies, got {}",
                replies.len()
            )));
        };

        let on_target = parse_flag(on_target, "ONT?")?;
        let overflow = parse_flag(overflow, "OVF?")?;
        let servo = parse_flag(servo, "SVO?")?;
        let position_counts: f64 = position.trim().parse().map_err(|_| {
            DecodeError::Malformed(format!(
                "bad position reply '{}' for channel {}",
                position,
                Self::channel(axis)
            ))
        })?;

        Ok(RawAxisStatus {
            busy: Some(!on_target),
            // No home switch; a settled axis reads as homed.
            homed: on_target,
            high_limit: overflow,
            low_limit: false,
            direction_positive: true,
            fault: overflow,
            power_on: servo,
            position_counts,
            encoder_counts: None,
            velocity_counts: None,
        })
    }

    fn move_command(
        &self,
        axis: usize,
        target_counts: f64,
        relative: bool,
        _speed: SpeedTerms,
    ) -> String {
        // Piezo moves are settling steps; there is no velocity profile to
        // program.
        let verb = if relative { "MVR" } else { "MOV" };
        format!("{} {} {:.4}", verb, Self::channel(axis), target_counts)
    }

    fn home_command(
        &self,
        _axis: usize,
        _forwards: bool,
        _speed: SpeedTerms,
    ) -> MotorResult<String> {
        Err(MotorError::NotSupported("home"))
    }

    fn jog_command(
        &self,
        _axis: usize,
        _velocity_counts: f64,
        _accel_counts: Option<f64>,
        _soft_limits: Option<(f64, f64)>,
    ) -> MotorResult<String> {
        Err(MotorError::NotSupported("jog"))
    }

    fn stop_command(&self, axis: usize, _decel_counts: Option<f64>) -> String {
        // A zero-length relative move halts the settling motion in place.
        format!("MVR {} 0", Self::channel(axis))
    }

    fn param_write(&self, axis: usize, param: MotorParam, value_counts: f64) -> ParamWrite {
        match param {
            MotorParam::ClosedLoop => {
                let state = if value_counts != 0.0 { 1 } else { 0 };
                ParamWrite::Command(format!("SVO {} {}", Self::channel(axis), state))
            }
            _ => ParamWrite::Unsupported,
        }
    }
}

fn parse_flag(reply: &str, query: &str) -> Result<bool, DecodeError> {
    match reply.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(DecodeError::Malformed(format!(
            "bad {} reply '{}'",
            query, other
        ))),
    }
}
