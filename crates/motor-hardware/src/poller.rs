//! Adaptive background status poller.
//!
//! One poller task per controller. Each cycle issues the profile's status
//! queries through the shared transaction engine, decodes per-axis raw
//! status, refines it into snapshots and publishes deltas. The cycle
//! period adapts: fast while anything is moving (or a command just forced
//! a fast burst), slow while everything is at rest, wake-only when the
//! idle period is zero.
//!
//! Failure policy: a failed transaction or an undecodable payload marks
//! the affected axes with the sticky `comm_error` flag and otherwise
//! leaves their previous snapshot fields untouched. The poller never
//! invents values and never exits; the next successful cycle clears the
//! flag.

use std::sync::Arc;
use std::time::Duration;

use motor_core::status::refine;
use motor_core::{AxisSnapshot, MotorError, MotorResult, RawAxisStatus};

use crate::axis::Axis;
use crate::controller::{Controller, PollSettings};
use crate::profile::PollScope;

/// Choose the sleep before the next cycle. `None` means wait for a wake
/// signal only.
pub fn next_period(any_moving: bool, forced_fast: bool, settings: &PollSettings) -> Option<Duration> {
    if any_moving || forced_fast {
        Some(settings.moving_period)
    } else if settings.idle_period.is_zero() {
        None
    } else {
        Some(settings.idle_period)
    }
}

/// Poll loop body. Runs until the controller is dropped by everyone else
/// and the runtime shuts the task down.
pub(crate) async fn run(controller: Arc<Controller>) {
    let settings = controller.poll_settings();
    tracing::info!(
        target: "motor::poller",
        controller = controller.id(),
        moving_period_ms = settings.moving_period.as_millis() as u64,
        idle_period_ms = settings.idle_period.as_millis() as u64,
        "poller started"
    );

    // Startup cycle: publish real hardware state before the first wait.
    let mut any_moving = poll_cycle(&controller).await;
    let mut forced_fast = 0u32;

    loop {
        match next_period(any_moving, forced_fast > 0, &settings) {
            Some(period) => {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = controller.wake_signal().notified() => {
                        forced_fast = forced_fast.max(settings.forced_fast_polls);
                    }
                }
            }
            None => {
                controller.wake_signal().notified().await;
                forced_fast = forced_fast.max(settings.forced_fast_polls);
            }
        }

        any_moving = poll_cycle(&controller).await;
        forced_fast = forced_fast.saturating_sub(1);
    }
}

/// One full status cycle over every axis. Returns whether any axis is
/// moving or still expected to move.
async fn poll_cycle(controller: &Controller) -> bool {
    let profile = controller.profile();
    let mut any_moving = false;

    match profile.poll_scope() {
        PollScope::Controller => {
            let mut generations = Vec::with_capacity(controller.axes().len());
            for axis in controller.axes() {
                generations.push(axis.lock().await.command_seq);
            }
            let outcome = run_queries(controller, None).await;
            for (axis, generation) in controller.axes().iter().zip(generations) {
                let status = outcome.as_ref().map_err(MotorError::clone).and_then(
                    |replies| {
                        profile
                            .decode_status(replies, axis.id().index)
                            .map_err(|e| MotorError::MalformedReply(e.to_string()))
                    },
                );
                any_moving |=
                    apply_status(axis, status, &controller.poll_settings(), generation).await;
            }
        }
        PollScope::PerAxis => {
            for axis in controller.axes() {
                let index = axis.id().index;
                let generation = axis.lock().await.command_seq;
                let status = match run_queries(controller, Some(index)).await {
                    Ok(replies) => profile
                        .decode_status(&replies, index)
                        .map_err(|e| MotorError::MalformedReply(e.to_string())),
                    Err(e) => Err(e),
                };
                any_moving |=
                    apply_status(axis, status, &controller.poll_settings(), generation).await;
            }
        }
    }

    any_moving
}

/// Issue one transaction set and collect the replies in query order.
async fn run_queries(
    controller: &Controller,
    axis: Option<usize>,
) -> MotorResult<Vec<String>> {
    let profile = controller.profile();
    let queries = profile.status_queries(axis);
    let mut replies = Vec::with_capacity(queries.len());
    for query in &queries {
        let reply = controller
            .engine()
            .transact_filtered(query, |l| profile.is_ack_line(l))
            .await?;
        replies.push(reply);
    }
    Ok(replies)
}

/// Fold one cycle's outcome for one axis into its shared state and publish
/// the delta, if any. `generation` is the axis command sequence sampled
/// before the fetch; a mismatch means a command was dispatched while the
/// payload was on the wire. Returns whether the axis still counts as
/// moving for rate selection.
async fn apply_status(
    axis: &Arc<Axis>,
    status: MotorResult<RawAxisStatus>,
    settings: &PollSettings,
    generation: u64,
) -> bool {
    let mut to_publish: Option<AxisSnapshot> = None;

    let mut shared = axis.lock().await;
    let moving = match status {
        Ok(raw) => {
            let mut snap = refine(&raw, &axis.config().conversion);

            if shared.command_seq != generation {
                // The payload predates a dispatched command and cannot
                // reflect the new motion; keep the handshake state until a
                // fetch from the current generation reports done.
                snap.moving = true;
                snap.done = false;
                shared.at_rest_polls = 0;
            } else if snap.moving {
                shared.at_rest_polls = 0;
            } else if shared.expected_moving || shared.snapshot.moving {
                // A motion just came to rest. Hold the moving state until
                // enough consecutive at-rest cycles have been seen.
                shared.at_rest_polls += 1;
                if shared.at_rest_polls < settings.done_debounce {
                    snap.moving = true;
                    snap.done = false;
                }
            }

            if snap.done {
                shared.expected_moving = false;
                shared.at_rest_polls = 0;
            }

            if snap.differs_from(&shared.snapshot) {
                to_publish = Some(snap);
            }
            shared.snapshot = snap;
            snap.moving
        }
        Err(err) => {
            tracing::warn!(
                target: "motor::poller",
                axis = %axis.id(),
                error = %err,
                "status cycle failed"
            );
            // Keep every previous field. Only the sticky flag changes, and
            // expected_moving survives so a glitch cannot fake completion.
            if !shared.snapshot.comm_error {
                shared.snapshot.comm_error = true;
                to_publish = Some(shared.snapshot);
            }
            shared.snapshot.moving
        }
    };
    let still_expected = shared.expected_moving;
    drop(shared);

    if let Some(snapshot) = to_publish {
        axis.publish(snapshot);
    }

    moving || still_expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisConfig, AxisId};

    fn settings(idle_ms: u64) -> PollSettings {
        PollSettings {
            moving_period: Duration::from_millis(100),
            idle_period: Duration::from_millis(idle_ms),
            forced_fast_polls: 10,
            done_debounce: 1,
        }
    }

    #[test]
    fn moving_selects_the_fast_period() {
        let s = settings(1000);
        assert_eq!(next_period(true, false, &s), Some(s.moving_period));
    }

    #[test]
    fn forced_fast_overrides_idle() {
        let s = settings(1000);
        assert_eq!(next_period(false, true, &s), Some(s.moving_period));
    }

    #[test]
    fn at_rest_selects_the_idle_period() {
        let s = settings(1000);
        assert_eq!(next_period(false, false, &s), Some(s.idle_period));
    }

    #[test]
    fn zero_idle_period_means_wake_only() {
        let s = settings(0);
        assert_eq!(next_period(false, false, &s), None);
        // Motion still polls periodically.
        assert_eq!(next_period(true, false, &s), Some(s.moving_period));
    }

    fn test_axis() -> Arc<Axis> {
        Axis::new(
            AxisId {
                controller: 0,
                index: 0,
            },
            AxisConfig::default(),
        )
    }

    fn at_rest_payload() -> RawAxisStatus {
        RawAxisStatus {
            busy: Some(false),
            power_on: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn payload_fetched_before_a_command_cannot_report_done() {
        let axis = test_axis();

        // The fetch samples the generation, then a move is dispatched while
        // the at-rest payload is still on the wire.
        let generation = axis.lock().await.command_seq;
        {
            let mut shared = axis.lock().await;
            shared.command_seq = shared.command_seq.wrapping_add(1);
            shared.expected_moving = true;
            shared.snapshot.done = false;
            shared.snapshot.moving = true;
        }

        let moving =
            apply_status(&axis, Ok(at_rest_payload()), &settings(1000), generation).await;

        assert!(moving);
        let shared = axis.lock().await;
        assert!(!shared.snapshot.done);
        assert!(shared.snapshot.moving);
        assert!(shared.expected_moving);
    }

    #[tokio::test]
    async fn payload_from_the_current_generation_completes_the_move() {
        let axis = test_axis();

        {
            let mut shared = axis.lock().await;
            shared.command_seq = shared.command_seq.wrapping_add(1);
            shared.expected_moving = true;
            shared.snapshot.done = false;
            shared.snapshot.moving = true;
        }
        let generation = axis.lock().await.command_seq;

        let moving =
            apply_status(&axis, Ok(at_rest_payload()), &settings(1000), generation).await;

        assert!(!moving);
        let shared = axis.lock().await;
        assert!(shared.snapshot.done);
        assert!(!shared.expected_moving);
    }
}
