//! Per-axis shared state.
//!
//! An [`Axis`] is the unit of consumer interaction: it holds the latest
//! [`AxisSnapshot`], the parameter cache, and the motion-expectation state
//! the poller uses for debouncing. All of it sits behind one async mutex;
//! both the poller and command dispatch take the same lock, which is what
//! makes the command/status handshake atomic.
//!
//! State-change events go out on a broadcast channel. Publishing happens
//! only after the axis lock is released, so a slow subscriber can never
//! stall a poll cycle or a command.

use std::fmt;
use std::sync::Arc;

use motor_core::{AxisConversion, AxisSnapshot, ParamCache};
use tokio::sync::{broadcast, Mutex, MutexGuard};

const EVENT_CAPACITY: usize = 64;

/// Stable identity of one axis: controller id plus zero-based axis index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisId {
    pub controller: u32,
    pub index: usize,
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.controller, self.index)
    }
}

/// Fixed per-axis setup, resolved from configuration at connect time.
#[derive(Debug, Clone)]
pub struct AxisConfig {
    /// Display name, e.g. "1" for a numbered vendor or "X" for a lettered
    /// one.
    pub name: String,
    /// Unit conversion and polarity corrections.
    pub conversion: AxisConversion,
    /// Direction used when a home request does not specify one.
    pub home_forwards: bool,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            conversion: AxisConversion::default(),
            home_forwards: true,
        }
    }
}

/// Snapshot change notification.
#[derive(Debug, Clone)]
pub struct AxisEvent {
    pub axis: AxisId,
    pub snapshot: AxisSnapshot,
}

/// Mutable axis state guarded by the axis lock.
#[derive(Debug, Default)]
pub(crate) struct AxisShared {
    /// Latest published status/position record.
    pub snapshot: AxisSnapshot,
    /// Last-written parameter values.
    pub params: ParamCache,
    /// Set by move/home/jog dispatch, cleared when a poll reports done.
    /// Keeps the fast poll rate across the command/status gap, and survives
    /// comm-error cycles so a glitch cannot fake completion.
    pub expected_moving: bool,
    /// Consecutive at-rest polls seen while motion was expected.
    pub at_rest_polls: u32,
    /// Bumped by every dispatched motion command. The poller samples it
    /// before fetching status; a payload from an older generation was on
    /// the wire before the command and cannot report the motion done.
    pub command_seq: u64,
}

/// One motor axis on one controller.
pub struct Axis {
    id: AxisId,
    config: AxisConfig,
    shared: Mutex<AxisShared>,
    events: broadcast::Sender<AxisEvent>,
}

impl Axis {
    pub(crate) fn new(id: AxisId, config: AxisConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            id,
            config,
            shared: Mutex::new(AxisShared::default()),
            events,
        })
    }

    pub fn id(&self) -> AxisId {
        self.id
    }

    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    /// Current snapshot, by value.
    pub async fn snapshot(&self) -> AxisSnapshot {
        self.shared.lock().await.snapshot
    }

    /// Subscribe to snapshot changes. Only deltas are published; a new
    /// subscriber should read [`snapshot`](Self::snapshot) once for the
    /// starting state.
    pub fn subscribe(&self) -> broadcast::Receiver<AxisEvent> {
        self.events.subscribe()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, AxisShared> {
        self.shared.lock().await
    }

    /// Publish a snapshot change. Callers must have released the axis lock
    /// first.
    pub(crate) fn publish(&self, snapshot: AxisSnapshot) {
        // A lagging or absent subscriber is not an error.
        let _ = self.events.send(AxisEvent {
            axis: self.id,
            snapshot,
        });
    }
}
