//! Core types and pure logic for the motion-axis control stack.
//!
//! This crate is the leaf of the workspace: it knows nothing about any
//! particular motor controller. It provides the pieces every vendor adapter
//! shares:
//!
//! - [`transport`]: a line-framed request/response primitive over any async
//!   byte stream (serial port, TCP socket, or an in-memory mock)
//! - [`error`]: the closed error taxonomy for the whole stack
//! - [`status`]: the generic [`status::AxisSnapshot`] and the pure
//!   refinement step that turns a decoded vendor payload into one
//! - [`params`]: the closed motor parameter set and its per-axis cache
//! - [`retry`]: the bounded-retry policy shared by all adapters
//!
//! Vendor knowledge (command grammars, status bit layouts, polling shape)
//! lives in `motor-hardware` behind its `VendorProfile` trait.

pub mod error;
pub mod params;
pub mod retry;
pub mod status;
pub mod transport;

pub use error::{MotorError, MotorResult};
pub use params::{MotorParam, ParamCache};
pub use retry::RetryPolicy;
pub use status::{AxisConversion, AxisSnapshot, DecodeError, RawAxisStatus};
pub use transport::{DynSerial, Framing, LineTransport, TransportError};
