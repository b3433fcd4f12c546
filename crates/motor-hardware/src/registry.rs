//! Controller registry and the per-axis command dispatcher.
//!
//! The [`ControllerRegistry`] is the explicit root object an application
//! builds its controllers into; axes are reached by opening an
//! [`AxisHandle`] from it. Handles are cheap clones sharing the underlying
//! controller.
//!
//! The handle is where the command/status handshake lives: every motion
//! command validates its arguments, converts engineering units to raw
//! counts, sends the vendor command, marks the axis not-done under the
//! axis lock, and wakes the poller — in that order. A caller that reads
//! the snapshot immediately after a successful command therefore always
//! sees `done == false`; there is no window in which a stale "done" can
//! leak through.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use motor_core::{AxisSnapshot, MotorError, MotorParam, MotorResult};
use tokio::sync::broadcast;

use crate::axis::{Axis, AxisEvent, AxisId};
use crate::controller::Controller;
use crate::profile::{ParamWrite, SpeedTerms};

/// All connected controllers, keyed by id.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: HashMap<u32, Arc<Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, controller: Arc<Controller>) -> anyhow::Result<()> {
        let id = controller.id();
        if self.controllers.contains_key(&id) {
            bail!("controller id {} is already registered", id);
        }
        self.controllers.insert(id, controller);
        Ok(())
    }

    pub fn controller(&self, id: u32) -> Option<&Arc<Controller>> {
        self.controllers.get(&id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Arc<Controller>> {
        self.controllers.values()
    }

    /// Open a handle on one axis.
    pub fn open(&self, controller_id: u32, axis_index: usize) -> anyhow::Result<AxisHandle> {
        let Some(controller) = self.controllers.get(&controller_id) else {
            bail!("no controller with id {}", controller_id);
        };
        let Some(axis) = controller.axis(axis_index) else {
            bail!(
                "controller {} has no axis {} ({} configured)",
                controller_id,
                axis_index,
                controller.axes().len()
            );
        };
        Ok(AxisHandle {
            controller: Arc::clone(controller),
            axis: Arc::clone(axis),
        })
    }

    /// Concatenated [`Controller::report`] of every controller.
    pub async fn report(&self) -> String {
        let mut ids: Vec<u32> = self.controllers.keys().copied().collect();
        ids.sort_unstable();
        let mut out = String::new();
        for id in ids {
            if let Some(controller) = self.controllers.get(&id) {
                out.push_str(&controller.report().await);
            }
        }
        out
    }
}

/// Velocity profile for a motion command, in engineering units. A value of
/// zero (the default) leaves that term to the controller's own default;
/// negative values are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveSpeed {
    /// Starting velocity of the ramp, units/s.
    pub min_velocity: f64,
    /// Slew velocity, units/s.
    pub max_velocity: f64,
    /// Acceleration, units/s².
    pub acceleration: f64,
}

/// Cloneable command interface to one axis.
#[derive(Clone)]
pub struct AxisHandle {
    controller: Arc<Controller>,
    axis: Arc<Axis>,
}

impl AxisHandle {
    pub fn id(&self) -> AxisId {
        self.axis.id()
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Latest status/position snapshot.
    pub async fn snapshot(&self) -> AxisSnapshot {
        self.axis.snapshot().await
    }

    /// Subscribe to snapshot-change events for this axis.
    pub fn subscribe(&self) -> broadcast::Receiver<AxisEvent> {
        self.axis.subscribe()
    }

    /// Ask the poller for an immediate refresh cycle.
    pub fn force_refresh(&self) {
        self.controller.wake();
    }

    /// Start a move to `target` engineering units (relative to the current
    /// position when `relative`).
    ///
    /// On success the axis snapshot already reads not-done and the poller
    /// has been woken for a fast burst.
    #[tracing::instrument(skip(self), fields(axis = %self.axis.id()), err)]
    pub async fn move_to(&self, target: f64, relative: bool, speed: MoveSpeed) -> MotorResult<()> {
        finite("target", target)?;
        let terms = self.speed_terms(speed)?;
        let command = self.controller.profile().move_command(
            self.axis.id().index,
            self.to_counts(target),
            relative,
            terms,
        );
        self.dispatch_motion(&command).await
    }

    /// Start a home search. `forwards` falls back to the configured
    /// per-axis default direction.
    #[tracing::instrument(skip(self), fields(axis = %self.axis.id()), err)]
    pub async fn home(&self, forwards: Option<bool>, speed: MoveSpeed) -> MotorResult<()> {
        let terms = self.speed_terms(speed)?;
        let forwards = forwards.unwrap_or(self.axis.config().home_forwards);
        let command =
            self.controller
                .profile()
                .home_command(self.axis.id().index, forwards, terms)?;
        self.dispatch_motion(&command).await
    }

    /// Start a constant-velocity jog; the sign of `velocity` is the
    /// direction. Ends with [`stop`](Self::stop).
    #[tracing::instrument(skip(self), fields(axis = %self.axis.id()), err)]
    pub async fn jog(&self, velocity: f64, acceleration: Option<f64>) -> MotorResult<()> {
        finite("velocity", velocity)?;
        if velocity == 0.0 {
            return Err(MotorError::InvalidArgument(
                "jog velocity must be nonzero".into(),
            ));
        }
        let accel_counts = match acceleration {
            Some(a) => Some(self.to_counts(finite("acceleration", a)?)),
            None => None,
        };
        let soft_limits = {
            let shared = self.axis.lock().await;
            shared
                .params
                .soft_limits()
                .map(|(low, high)| (self.to_counts(low), self.to_counts(high)))
        };
        let command = self.controller.profile().jog_command(
            self.axis.id().index,
            self.to_counts(velocity),
            accel_counts,
            soft_limits,
        )?;
        self.dispatch_motion(&command).await
    }

    /// Stop axis motion. Idempotent: succeeds (and sends the vendor stop)
    /// even when the axis is already at rest.
    #[tracing::instrument(skip(self), fields(axis = %self.axis.id()), err)]
    pub async fn stop(&self, deceleration: Option<f64>) -> MotorResult<()> {
        let decel_counts = match deceleration {
            Some(d) => Some(self.to_counts(finite("deceleration", d)?)),
            None => None,
        };
        let command = self
            .controller
            .profile()
            .stop_command(self.axis.id().index, decel_counts);
        self.controller.engine().send(&command).await?;
        // No handshake: stopping does not promise new motion, the poller
        // just needs to pick up the settling state quickly.
        self.controller.wake();
        Ok(())
    }

    /// Write a motor parameter, in engineering units where the parameter
    /// is position-like. The value is cached for readback once the vendor
    /// transaction (if any) succeeds.
    #[tracing::instrument(skip(self), fields(axis = %self.axis.id(), param = param.label()), err)]
    pub async fn set_parameter(&self, param: MotorParam, value: f64) -> MotorResult<()> {
        finite(param.label(), value)?;
        let raw = if is_position_like(param) {
            self.to_counts(value)
        } else {
            value
        };
        match self
            .controller
            .profile()
            .param_write(self.axis.id().index, param, raw)
        {
            ParamWrite::Command(command) => {
                self.controller.engine().send(&command).await?;
                self.controller.wake();
            }
            ParamWrite::CacheOnly => {}
            ParamWrite::Unsupported => return Err(MotorError::NotSupported(param.label())),
        }
        let mut shared = self.axis.lock().await;
        shared.params.set(param, value);
        Ok(())
    }

    /// Read back a parameter. `Position` reads the live snapshot; every
    /// other parameter reads the last written value, `Ok(None)` if it was
    /// never written. Unsupported parameters are an error, not `None`.
    pub async fn get_parameter(&self, param: MotorParam) -> MotorResult<Option<f64>> {
        if param == MotorParam::Position {
            return Ok(Some(self.axis.snapshot().await.position));
        }
        if !self
            .controller
            .profile()
            .supports_param(self.axis.id().index, param)
        {
            // Cache-only parameters count as supported; see ParamWrite.
            return Err(MotorError::NotSupported(param.label()));
        }
        let shared = self.axis.lock().await;
        Ok(shared.params.get(param))
    }

    /// Send a motion command and perform the not-done handshake.
    async fn dispatch_motion(&self, command: &str) -> MotorResult<()> {
        self.controller.engine().send(command).await?;

        let mut to_publish = None;
        {
            let mut shared = self.axis.lock().await;
            shared.command_seq = shared.command_seq.wrapping_add(1);
            shared.expected_moving = true;
            shared.at_rest_polls = 0;
            let changed = shared.snapshot.done || !shared.snapshot.moving;
            shared.snapshot.done = false;
            shared.snapshot.moving = true;
            if changed {
                to_publish = Some(shared.snapshot);
            }
        }
        if let Some(snapshot) = to_publish {
            self.axis.publish(snapshot);
        }

        self.controller.wake();
        Ok(())
    }

    fn to_counts(&self, value: f64) -> f64 {
        value / self.axis.config().conversion.units_per_step
    }

    fn speed_terms(&self, speed: MoveSpeed) -> MotorResult<SpeedTerms> {
        // Zero is the device-default sentinel; anything below it is a
        // caller error, not a direction.
        let term = |name: &str, v: f64| -> MotorResult<Option<f64>> {
            finite(name, v)?;
            if v < 0.0 {
                return Err(MotorError::InvalidArgument(format!(
                    "{} must be zero (device default) or positive, got {}",
                    name, v
                )));
            }
            Ok((v > 0.0).then(|| self.to_counts(v).abs()))
        };
        Ok(SpeedTerms {
            base_velocity: term("min_velocity", speed.min_velocity)?,
            velocity: term("max_velocity", speed.max_velocity)?,
            acceleration: term("acceleration", speed.acceleration)?,
        })
    }
}

fn is_position_like(param: MotorParam) -> bool {
    matches!(
        param,
        MotorParam::Position | MotorParam::LowLimit | MotorParam::HighLimit
    )
}

fn finite(name: &str, value: f64) -> MotorResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MotorError::InvalidArgument(format!(
            "{} must be finite, got {}",
            name, value
        )))
    }
}
