//! TOML rig configuration and registry bootstrap.
//!
//! A rig file declares every controller: which vendor profile it speaks,
//! how to reach it (TCP always; RS-232 behind the `serial` feature), its
//! poll tunables, and the unit/polarity setup of each axis:
//!
//! ```toml
//! [[controllers]]
//! id = 0
//! profile = "mm4000"
//! endpoint = { kind = "tcp", addr = "10.0.0.5:4001" }
//! poll = { moving_period_ms = 100, idle_period_ms = 1000 }
//!
//! [[controllers.axes]]
//! units_per_step = 0.001
//!
//! [[controllers.axes]]
//! units_per_step = 0.0005
//! limit_invert = true
//! ```
//!
//! [`build_registry`] turns a parsed file into connected controllers with
//! their pollers running.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use motor_core::{transport, AxisConversion, DynSerial};
use serde::Deserialize;

use crate::axis::AxisConfig;
use crate::controller::{Controller, PollSettings};
use crate::profile::VendorProfile;
use crate::profiles;
use crate::registry::ControllerRegistry;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RigConfig {
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub id: u32,
    /// Vendor profile name; see [`profiles::by_name`].
    pub profile: String,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub poll: PollConfig,
    pub axes: Vec<AxisSetup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
    Tcp {
        addr: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    #[serde(default = "default_moving_period_ms")]
    pub moving_period_ms: u64,
    #[serde(default = "default_idle_period_ms")]
    pub idle_period_ms: u64,
    #[serde(default = "default_forced_fast_polls")]
    pub forced_fast_polls: u32,
    #[serde(default = "default_done_debounce")]
    pub done_debounce: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            moving_period_ms: default_moving_period_ms(),
            idle_period_ms: default_idle_period_ms(),
            forced_fast_polls: default_forced_fast_polls(),
            done_debounce: default_done_debounce(),
        }
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(cfg: &PollConfig) -> Self {
        Self {
            moving_period: Duration::from_millis(cfg.moving_period_ms),
            idle_period: Duration::from_millis(cfg.idle_period_ms),
            forced_fast_polls: cfg.forced_fast_polls,
            done_debounce: cfg.done_debounce.max(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisSetup {
    /// Display name; defaults to the profile's own axis naming.
    pub name: Option<String>,
    #[serde(default = "default_units_per_step")]
    pub units_per_step: f64,
    #[serde(default)]
    pub has_encoder: bool,
    #[serde(default)]
    pub limit_invert: bool,
    #[serde(default)]
    pub reverse_direction: bool,
    #[serde(default = "default_home_forwards")]
    pub home_forwards: bool,
}

fn default_baud() -> u32 {
    9600
}

fn default_moving_period_ms() -> u64 {
    100
}

fn default_idle_period_ms() -> u64 {
    1000
}

fn default_forced_fast_polls() -> u32 {
    10
}

fn default_done_debounce() -> u32 {
    1
}

fn default_units_per_step() -> f64 {
    1.0
}

fn default_home_forwards() -> bool {
    true
}

impl RigConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("failed to parse rig configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rig configuration {}", path.display()))?;
        Self::from_toml(&text)
    }
}

fn axis_configs(profile: &Arc<dyn VendorProfile>, setups: &[AxisSetup]) -> Vec<AxisConfig> {
    setups
        .iter()
        .enumerate()
        .map(|(index, setup)| AxisConfig {
            name: setup
                .name
                .clone()
                .unwrap_or_else(|| profile.axis_name(index)),
            conversion: AxisConversion {
                units_per_step: setup.units_per_step,
                has_encoder: setup.has_encoder,
                limit_invert: setup.limit_invert,
                reverse_direction: setup.reverse_direction,
            },
            home_forwards: setup.home_forwards,
        })
        .collect()
}

async fn open_endpoint(endpoint: &Endpoint, name: &str) -> anyhow::Result<DynSerial> {
    match endpoint {
        Endpoint::Tcp { addr } => transport::connect_tcp(addr, name).await,
        #[cfg(feature = "serial")]
        Endpoint::Serial { port, baud } => transport::open_serial_async(port, *baud, name).await,
        #[cfg(not(feature = "serial"))]
        Endpoint::Serial { port, .. } => {
            anyhow::bail!(
                "serial endpoint {} requires building with the 'serial' feature",
                port
            )
        }
    }
}

/// Connect every configured controller and start its poller.
pub async fn build_registry(config: &RigConfig) -> anyhow::Result<ControllerRegistry> {
    let mut registry = ControllerRegistry::new();
    for controller_cfg in &config.controllers {
        let profile = profiles::by_name(&controller_cfg.profile)
            .with_context(|| format!("controller {}", controller_cfg.id))?;
        let port = open_endpoint(
            &controller_cfg.endpoint,
            &format!("{}-{}", profile.name(), controller_cfg.id),
        )
        .await?;
        let axes = axis_configs(&profile, &controller_cfg.axes);
        let controller = Controller::connect(
            controller_cfg.id,
            profile,
            port,
            axes,
            PollSettings::from(&controller_cfg.poll),
        )
        .await?;
        controller.start_poller();
        registry.register(controller)?;
    }
    Ok(registry)
}
