//! Controller and axis layer of the motion-axis control stack.
//!
//! The shape of the crate follows the lifecycle of a rig:
//!
//! 1. [`config`] parses a TOML rig file and [`config::build_registry`]
//!    connects everything in it.
//! 2. [`controller::Controller::connect`] performs the discovery
//!    handshake over a [`transaction::TransactionEngine`], which
//!    serializes every exchange on the half-duplex link.
//! 3. A background [`poller`] task per controller keeps each
//!    [`axis::Axis`] snapshot fresh, fast while moving and slow at rest.
//! 4. Consumers open an [`registry::AxisHandle`] and issue moves, homes,
//!    jogs, stops and parameter writes in engineering units; vendor
//!    spelling lives behind [`profile::VendorProfile`] with the built-in
//!    implementations in [`profiles`].
//!
//! [`mock_serial`] provides the in-memory port used throughout the test
//! suites.

pub mod axis;
pub mod config;
pub mod controller;
pub mod mock_serial;
pub mod poller;
pub mod profile;
pub mod profiles;
pub mod registry;
pub mod transaction;

pub use axis::{Axis, AxisConfig, AxisEvent, AxisId};
pub use config::{build_registry, RigConfig};
pub use controller::{Controller, PollSettings};
pub use profile::{ControllerInfo, ParamWrite, PollScope, SpeedTerms, VendorProfile};
pub use registry::{AxisHandle, ControllerRegistry, MoveSpeed};
pub use transaction::{TransactionEngine, TransactionSettings};
