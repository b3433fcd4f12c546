//! Newport MM4000/MM4005 profile.
//!
//! Numbered axes, CR-framed ASCII, semicolon-chained commands. Status is
//! controller-scoped: one cycle issues `MS;` (per-axis status bytes),
//! `TP;` (per-axis positions) and `TE;` (controller error flag), each
//! answered with one comma-separated line covering every axis.
//!
//! The controller has no native jog; a jog request is translated into an
//! absolute move toward the relevant soft travel limit at the requested
//! velocity, which is why jogging requires both soft limits to have been
//! written first.

use motor_core::{DecodeError, Framing, MotorError, MotorParam, MotorResult, RawAxisStatus};

use crate::profile::{ControllerInfo, ParamWrite, PollScope, SpeedTerms, VendorProfile};

/// One axis's `MS` status byte.
///
/// Bit 6 (0x40) is a constant printable-range offset and carries no
/// information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mm4000Status(pub u8);

impl Mm4000Status {
    const MOVING: u8 = 0x01;
    const POWER_OFF: u8 = 0x02;
    const DIRECTION_POSITIVE: u8 = 0x04;
    const HIGH_LIMIT: u8 = 0x08;
    const LOW_LIMIT: u8 = 0x10;
    const HOME: u8 = 0x20;

    pub fn moving(self) -> bool {
        self.0 & Self::MOVING != 0
    }

    pub fn power_on(self) -> bool {
        self.0 & Self::POWER_OFF == 0
    }

    pub fn direction_positive(self) -> bool {
        self.0 & Self::DIRECTION_POSITIVE != 0
    }

    pub fn high_limit(self) -> bool {
        self.0 & Self::HIGH_LIMIT != 0
    }

    pub fn low_limit(self) -> bool {
        self.0 & Self::LOW_LIMIT != 0
    }

    pub fn home(self) -> bool {
        self.0 & Self::HOME != 0
    }
}

#[derive(Debug, Default)]
pub struct Mm4000;

impl Mm4000 {
    /// One-based axis address used on the wire.
    fn address(axis: usize) -> usize {
        axis + 1
    }
}

impl VendorProfile for Mm4000 {
    fn name(&self) -> &'static str {
        "mm4000"
    }

    fn framing(&self) -> Framing {
        Framing::CR
    }

    fn max_axes(&self) -> usize {
        8
    }

    fn discovery_query(&self) -> &'static str {
        "VE;"
    }

    fn parse_discovery(&self, reply: &str) -> Result<ControllerInfo, DecodeError> {
        let model = if reply.contains("MM4005") || reply.contains("MM4006") {
            "MM4005"
        } else if reply.contains("MM4000") {
            "MM4000"
        } else {
            return Err(DecodeError::Malformed(format!(
                "not an MM4000 family identity: '{}'",
                reply
            )));
        };
        let firmware = reply
            .split_once("Version")
            .map(|(_, v)| v.trim())
            .unwrap_or_else(|| reply.trim());
        Ok(ControllerInfo {
            model: model.to_string(),
            firmware: firmware.to_string(),
        })
    }

    fn poll_scope(&self) -> PollScope {
        PollScope::Controller
    }

    fn status_queries(&self, _axis: Option<usize>) -> Vec<String> {
        vec!["MS;".to_string(), "TP;".to_string(), "TE;".to_string()]
    }

    fn decode_status(&self, replies: &[String], axis: usize) -> Result<RawAxisStatus, DecodeError> {
        let [status_line, position_line, error_line] = replies else {
            return Err(DecodeError::Malformed(format!(
                "expected 3 status replies, got {}",
                replies.len()
            )));
        };
        let address = Self::address(axis);

        let status_field = nth_field(status_line, axis)?;
        let status_byte = status_field
            .strip_prefix(&format!("{}MS", address))
            .and_then(|rest| rest.bytes().next())
            .ok_or_else(|| {
                DecodeError::Malformed(format!(
                    "bad status field '{}' for axis {}",
                    status_field, address
                ))
            })?;
        let status = Mm4000Status(status_byte);

        let position_field = nth_field(position_line, axis)?;
        let position_counts = position_field
            .strip_prefix(&format!("{}TP", address))
            .and_then(|rest| rest.trim().parse::<f64>().ok())
            .ok_or_else(|| {
                DecodeError::Malformed(format!(
                    "bad position field '{}' for axis {}",
                    position_field, address
                ))
            })?;

        // "TE@" is the no-error report; any other flag char is a fault.
        let error_flag = error_line
            .strip_prefix("TE")
            .and_then(|rest| rest.bytes().next())
            .ok_or_else(|| {
                DecodeError::Malformed(format!("bad error reply '{}'", error_line))
            })?;

        Ok(RawAxisStatus {
            busy: Some(status.moving()),
            homed: status.home(),
            high_limit: status.high_limit(),
            low_limit: status.low_limit(),
            direction_positive: status.direction_positive(),
            fault: error_flag != b'@',
            power_on: status.power_on(),
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
        speed: SpeedTerms,
    ) -> String {
        let address = Self::address(axis);
        let mut cmd = String::new();
        if let Some(accel) = speed.acceleration {
            cmd.push_str(&format!("{}AC{:.4};", address, accel));
        }
        if let Some(velocity) = speed.velocity {
            cmd.push_str(&format!("{}VA{:.4};", address, velocity));
        }
        let verb = if relative { "PR" } else { "PA" };
        cmd.push_str(&format!("{}{}{:.4};", address, verb, target_counts));
        cmd
    }

    fn home_command(
        &self,
        axis: usize,
        _forwards: bool,
        speed: SpeedTerms,
    ) -> MotorResult<String> {
        // The search direction is fixed by controller setup; the request's
        // direction is accepted and ignored.
        let address = Self::address(axis);
        let mut cmd = String::new();
        if let Some(accel) = speed.acceleration {
            cmd.push_str(&format!("{}AC{:.4};", address, accel));
        }
        if let Some(velocity) = speed.velocity {
            cmd.push_str(&format!("{}VA{:.4};", address, velocity));
        }
        cmd.push_str(&format!("{}OR;", address));
        Ok(cmd)
    }

    fn jog_command(
        &self,
        axis: usize,
        velocity_counts: f64,
        accel_counts: Option<f64>,
        soft_limits: Option<(f64, f64)>,
    ) -> MotorResult<String> {
        let Some((low, high)) = soft_limits else {
            return Err(MotorError::InvalidArgument(
                "jog on this controller moves toward a soft limit; set both travel limits first"
                    .into(),
            ));
        };
        let target = if velocity_counts > 0.0 { high } else { low };
        Ok(self.move_command(
            axis,
            target,
            false,
            SpeedTerms {
                base_velocity: None,
                velocity: Some(velocity_counts.abs()),
                acceleration: accel_counts,
            },
        ))
    }

    fn stop_command(&self, axis: usize, decel_counts: Option<f64>) -> String {
        let address = Self::address(axis);
        match decel_counts {
            Some(decel) => format!("{}AC{:.4};{}ST;", address, decel, address),
            None => format!("{}ST;", address),
        }
    }

    fn param_write(&self, axis: usize, param: MotorParam, value_counts: f64) -> ParamWrite {
        let address = Self::address(axis);
        match param {
            MotorParam::LowLimit => {
                ParamWrite::Command(format!("{}SL{:.4};", address, value_counts))
            }
            MotorParam::HighLimit => {
                ParamWrite::Command(format!("{}SR{:.4};", address, value_counts))
            }
            MotorParam::ClosedLoop => {
                let verb = if value_counts != 0.0 { "MO" } else { "MF" };
                ParamWrite::Command(format!("{}{};", address, verb))
            }
            _ => ParamWrite::Unsupported,
        }
    }
}

fn nth_field(line: &str, axis: usize) -> Result<&str, DecodeError> {
    line.split(',').nth(axis).ok_or_else(|| {
        DecodeError::Malformed(format!("no field for axis {} in '{}'", axis + 1, line))
    })
}
