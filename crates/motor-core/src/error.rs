//! Error taxonomy for the motion stack.
//!
//! Every failure the stack can surface falls into one of a small number of
//! categories, and callers are expected to branch on the category rather
//! than on message text:
//!
//! 1. **Communication errors** — [`MotorError::Link`], [`MotorError::Timeout`]
//!    and [`MotorError::MalformedReply`]. Inside the poller these never
//!    unwind the loop; they surface as the sticky `comm_error` flag on the
//!    axis snapshot. A caller-issued command returns them directly.
//!
//! 2. **Device faults** — [`MotorError::DeviceFault`]. The controller
//!    answered correctly and reported an in-band error (limit, over-current,
//!    following error). These are data, not control flow: the poller stores
//!    them as the snapshot `fault` flag instead of returning them.
//!
//! 3. **Caller errors** — [`MotorError::InvalidArgument`] and
//!    [`MotorError::NotSupported`]. Rejected locally, before any transaction
//!    is attempted.

use thiserror::Error;

/// Convenience alias for results using the stack error type.
pub type MotorResult<T> = std::result::Result<T, MotorError>;

/// Primary error type for the motion-axis stack.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotorError {
    /// Connection-level failure: the link dropped, was reset, or a write
    /// could not transfer the whole request.
    ///
    /// Fatal until the connection recovers; surfaced by the poller as a
    /// persistent `comm_error`.
    #[error("link error: {0}")]
    Link(String),

    /// No reply terminator arrived within the configured timeout, even
    /// after the transaction engine's bounded read retries.
    ///
    /// Transient; surfaced as `comm_error` for the affected poll cycle only.
    #[error("reply timed out after {attempts} read attempt(s)")]
    Timeout {
        /// Total read attempts issued before giving up.
        attempts: u32,
    },

    /// The device answered, but the payload could not be decoded.
    ///
    /// Never inferred as "motion done": a malformed status reply marks the
    /// cycle as a communication error and leaves the previous snapshot
    /// fields untouched.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The controller reported an in-band fault condition.
    #[error("device fault: {0}")]
    DeviceFault(String),

    /// The caller supplied an out-of-range or non-finite value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation has no meaning for this vendor or axis.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

impl MotorError {
    /// True for the failure classes the poller folds into `comm_error`.
    pub fn is_comm_error(&self) -> bool {
        matches!(
            self,
            MotorError::Link(_) | MotorError::Timeout { .. } | MotorError::MalformedReply(_)
        )
    }
}
