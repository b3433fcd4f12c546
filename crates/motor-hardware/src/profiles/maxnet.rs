//! OMS MAXnet profile.
//!
//! Lettered axes (X, Y, Z, T, U, V, R, S), LF-framed ASCII. Status is
//! controller-scoped and spread over six queries: per-axis flag groups,
//! position/encoder/velocity arrays, encoder status groups, and one hex
//! word carrying every hard-limit bit.
//!
//! Two MAXnet quirks shape the decode:
//!
//! - The done flag can stay clear while the axis stalls on a hard limit
//!   with zero velocity. The profile reports "not busy" only on an
//!   explicit done flag and otherwise leaves the decision to the measured
//!   velocity, so the poller's done debounce can ride out the stall.
//! - The limit word packs low limits in bits 0-7 and high limits in bits
//!   8-15, active-high or active-low depending on wiring; the raw bits are
//!   reported uncorrected and the per-axis polarity config flips them.

use motor_core::{DecodeError, Framing, MotorParam, MotorResult, RawAxisStatus};

use crate::profile::{ControllerInfo, ParamWrite, PollScope, SpeedTerms, VendorProfile};

const AXIS_CHARS: [char; 8] = ['X', 'Y', 'Z', 'T', 'U', 'V', 'R', 'S'];

#[derive(Debug, Default)]
pub struct Maxnet;

impl Maxnet {
    fn axis_char(axis: usize) -> char {
        AXIS_CHARS.get(axis).copied().unwrap_or('?')
    }
}

impl VendorProfile for Maxnet {
    fn name(&self) -> &'static str {
        "maxnet"
    }

    fn framing(&self) -> Framing {
        Framing::LF
    }

    fn max_axes(&self) -> usize {
        AXIS_CHARS.len()
    }

    fn axis_name(&self, index: usize) -> String {
        Self::axis_char(index).to_string()
    }

    fn discovery_query(&self) -> &'static str {
        "WY"
    }

    fn parse_discovery(&self, reply: &str) -> Result<ControllerInfo, DecodeError> {
        if !reply.contains("MAXnet") {
            return Err(DecodeError::Malformed(format!(
                "not a MAXnet identity: '{}'",
                reply
            )));
        }
        Ok(ControllerInfo {
            model: "MAXnet".to_string(),
            firmware: reply.trim().to_string(),
        })
    }

    fn poll_scope(&self) -> PollScope {
        PollScope::Controller
    }

    fn status_queries(&self, _axis: Option<usize>) -> Vec<String> {
        [
            "AM;RI;", // per-axis flag groups, e.g. "MDNN,PNNN,..."
            "PP;",    // motor positions
            "PE;",    // encoder positions
            "AM;RV;", // velocities
            "AM;EA;", // encoder status groups (slip flag)
            "AM;QL;", // hex hard-limit word
        ]
        .iter()
        .map(|q| q.to_string())
        .collect()
    }

    fn decode_status(&self, replies: &[String], axis: usize) -> Result<RawAxisStatus, DecodeError> {
        let [flags_line, pos_line, enc_line, velo_line, enc_status_line, limit_line] = replies
        else {
            return Err(DecodeError::Malformed(format!(
                "expected 6 status replies, got {}",
                replies.len()
            )));
        };

        let flags = nth_group(flags_line, axis)?;
        let flag_chars: Vec<char> = flags.chars().collect();
        if flag_chars.len() < 4 {
            return Err(DecodeError::Malformed(format!(
                "short flag group '{}' for axis {}",
                flags,
                Self::axis_char(axis)
            )));
        }
        let done = flag_chars[1] == 'D';
        let homed = flag_chars[3] == 'H';
        let direction_positive = flag_chars[0] == 'P';

        let position_counts = parse_array_field(pos_line, axis)?;
        let encoder_counts = parse_array_field(enc_line, axis)?;
        let velocity_counts = parse_array_field(velo_line, axis)?;

        let enc_status = nth_group(enc_status_line, axis)?;
        let fault = enc_status.chars().nth(2) == Some('S');

        let limit_word = u32::from_str_radix(limit_line.trim(), 16).map_err(|_| {
            DecodeError::Malformed(format!("bad limit word '{}'", limit_line))
        })?;
        let low_limit = limit_word & (1 << axis) != 0;
        let high_limit = limit_word & (1 << (axis + 8)) != 0;

        Ok(RawAxisStatus {
            // An explicit done flag is authoritative; otherwise velocity
            // decides and a limit stall settles through the debounce.
            busy: done.then_some(false),
            homed,
            high_limit,
            low_limit,
            direction_positive,
            fault,
            power_on: true,
            position_counts,
            encoder_counts: Some(encoder_counts),
            velocity_counts: Some(velocity_counts),
        })
    }

    fn move_command(
        &self,
        axis: usize,
        target_counts: f64,
        relative: bool,
        speed: SpeedTerms,
    ) -> String {
        let mut cmd = format!("A{} ", Self::axis_char(axis));
        if let Some(accel) = speed.acceleration {
            cmd.push_str(&format!("AC{}; ", accel.round() as i64));
        }
        if let Some(base) = speed.base_velocity {
            cmd.push_str(&format!("VB{}; ", base.round() as i64));
        }
        if let Some(velocity) = speed.velocity {
            cmd.push_str(&format!("VL{}; ", velocity.round() as i64));
        }
        let verb = if relative { "MR" } else { "MA" };
        cmd.push_str(&format!("{}{}; GO ID", verb, target_counts.round() as i64));
        cmd
    }

    fn home_command(&self, axis: usize, forwards: bool, speed: SpeedTerms) -> MotorResult<String> {
        let mut cmd = format!("A{} ", Self::axis_char(axis));
        if let Some(accel) = speed.acceleration {
            cmd.push_str(&format!("AC{}; ", accel.round() as i64));
        }
        if let Some(velocity) = speed.velocity {
            cmd.push_str(&format!("VL{}; ", velocity.round() as i64));
        }
        let verb = if forwards { "HM" } else { "HR" };
        cmd.push_str(&format!("{}; MA0 GO ID", verb));
        Ok(cmd)
    }

    fn jog_command(
        &self,
        axis: usize,
        velocity_counts: f64,
        accel_counts: Option<f64>,
        _soft_limits: Option<(f64, f64)>,
    ) -> MotorResult<String> {
        let mut cmd = format!("A{} ", Self::axis_char(axis));
        if let Some(accel) = accel_counts {
            cmd.push_str(&format!("AC{}; ", accel.round() as i64));
        }
        cmd.push_str(&format!("JG{};", velocity_counts.round() as i64));
        Ok(cmd)
    }

    fn stop_command(&self, axis: usize, decel_counts: Option<f64>) -> String {
        let axis_char = Self::axis_char(axis);
        match decel_counts {
            Some(decel) => format!("A{} AC{}; ST ID;", axis_char, decel.round() as i64),
            None => format!("A{} ST ID;", axis_char),
        }
    }

    fn param_write(&self, axis: usize, param: MotorParam, value_counts: f64) -> ParamWrite {
        let axis_char = Self::axis_char(axis);
        match param {
            MotorParam::Position => {
                ParamWrite::Command(format!("A{} LP{};", axis_char, value_counts.round() as i64))
            }
            MotorParam::EncoderRatio => ParamWrite::Command(format!(
                "A{} ER{},100000;",
                axis_char,
                (value_counts * 100000.0).round() as i64
            )),
            MotorParam::ProportionalGain => {
                ParamWrite::Command(format!("A{} KP{:.6};", axis_char, value_counts))
            }
            MotorParam::IntegralGain => {
                ParamWrite::Command(format!("A{} KI{:.6};", axis_char, value_counts))
            }
            MotorParam::DerivativeGain => {
                ParamWrite::Command(format!("A{} KD{:.6};", axis_char, value_counts))
            }
            MotorParam::ClosedLoop => {
                let verb = if value_counts != 0.0 { "HN" } else { "HF" };
                ParamWrite::Command(format!("A{} {}", axis_char, verb))
            }
            // Enforced host-side; the controller has no command for them.
            MotorParam::LowLimit | MotorParam::HighLimit | MotorParam::Resolution => {
                ParamWrite::CacheOnly
            }
        }
    }
}

fn nth_group(line: &str, axis: usize) -> Result<&str, DecodeError> {
    line.split(',').nth(axis).map(str::trim).ok_or_else(|| {
        DecodeError::Malformed(format!("no group for axis {} in '{}'", axis, line))
    })
}

fn parse_array_field(line: &str, axis: usize) -> Result<f64, DecodeError> {
    nth_group(line, axis)?.parse::<f64>().map_err(|_| {
        DecodeError::Malformed(format!("bad numeric field for axis {} in '{}'", axis, line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replies(
        flags: &str,
        positions: &str,
        encoders: &str,
        velocities: &str,
        enc_status: &str,
        limits: &str,
    ) -> Vec<String> {
        [flags, positions, encoders, velocities, enc_status, limits]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn decode_done_axis() {
        let raw = Maxnet
            .decode_status(
                &replies("PDNN,MNNN", "1250,-300", "1251,-299", "0,200", "ENNN,ENNN", "0000"),
                0,
            )
            .unwrap();
        assert_eq!(raw.busy, Some(false));
        assert!(raw.direction_positive);
        assert_eq!(raw.position_counts, 1250.0);
        assert_eq!(raw.encoder_counts, Some(1251.0));
        assert_eq!(raw.velocity_counts, Some(0.0));
    }

    #[test]
    fn not_done_defers_to_velocity() {
        let raw = Maxnet
            .decode_status(
                &replies("PDNN,MNNN", "1250,-300", "1251,-299", "0,200", "ENNN,ENNN", "0000"),
                1,
            )
            .unwrap();
        // No explicit done flag: busy stays undecided, velocity says moving.
        assert_eq!(raw.busy, None);
        assert_eq!(raw.velocity_counts, Some(200.0));
        assert!(!raw.direction_positive);
    }

    #[test]
    fn limit_word_splits_low_and_high_bits() {
        let replies = replies(
            "PDNN,PDNN",
            "0,0",
            "0,0",
            "0,0",
            "ENNN,ENNN",
            "0102", // low limit on axis 1, high limit on axis 0
        );
        let x = Maxnet.decode_status(&replies, 0).unwrap();
        assert!(x.high_limit);
        assert!(!x.low_limit);

        let y = Maxnet.decode_status(&replies, 1).unwrap();
        assert!(y.low_limit);
        assert!(!y.high_limit);
    }

    #[test]
    fn encoder_slip_is_a_fault() {
        let raw = Maxnet
            .decode_status(
                &replies("PDNN", "0", "0", "0", "ENSN", "0000"),
                0,
            )
            .unwrap();
        assert!(raw.fault);
    }

    #[test]
    fn home_flag_group() {
        let raw = Maxnet
            .decode_status(
                &replies("PDNH", "0", "0", "0", "ENNN", "0000"),
                0,
            )
            .unwrap();
        assert!(raw.homed);
    }

    #[test]
    fn garbage_limit_word_is_malformed() {
        let err = Maxnet
            .decode_status(&replies("PDNN", "0", "0", "0", "ENNN", "zz"), 0)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn move_command_addresses_the_axis_letter() {
        let cmd = Maxnet.move_command(
            1,
            12500.0,
            false,
            SpeedTerms {
                base_velocity: Some(100.0),
                velocity: Some(2000.0),
                acceleration: Some(20000.0),
            },
        );
        assert_eq!(cmd, "AY AC20000; VB100; VL2000; MA12500; GO ID");

        let relative = Maxnet.move_command(0, -400.0, true, SpeedTerms::default());
        assert_eq!(relative, "AX MR-400; GO ID");
    }

    #[test]
    fn home_direction_selects_the_verb() {
        let fwd = Maxnet.home_command(0, true, SpeedTerms::default()).unwrap();
        assert_eq!(fwd, "AX HM; MA0 GO ID");
        let back = Maxnet.home_command(0, false, SpeedTerms::default()).unwrap();
        assert_eq!(back, "AX HR; MA0 GO ID");
    }

    #[test]
    fn jog_is_native() {
        let cmd = Maxnet.jog_command(2, -1500.0, Some(20000.0), None).unwrap();
        assert_eq!(cmd, "AZ AC20000; JG-1500;");
    }

    #[test]
    fn soft_limits_are_cache_only() {
        assert_eq!(
            Maxnet.param_write(0, MotorParam::LowLimit, -1.0),
            ParamWrite::CacheOnly
        );
        assert_eq!(
            Maxnet.param_write(0, MotorParam::ClosedLoop, 1.0),
            ParamWrite::Command("AX HN".to_string())
        );
        assert_eq!(
            Maxnet.param_write(1, MotorParam::Position, 500.4),
            ParamWrite::Command("AY LP500;".to_string())
        );
    }
}
