//! Error types for the droid kernel.
//!
//! Tactical failures (unreachable destinations, illegal orders, dead
//! targets) are not errors: they surface as return values and debug logs.
//! Only misuse of the provided API and persistence failures end up here.

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Top-level error type for the kernel's provided API.
#[derive(Debug, Error)]
pub enum SimError {
    /// No live droid with this id exists.
    #[error("Droid not found: {0}")]
    DroidNotFound(u32),

    /// No live object (droid, structure or feature) with this id exists.
    #[error("Object not found: {0}")]
    ObjectNotFound(u32),

    /// Tuning or scenario configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid simulation state (usually a failed (de)serialisation).
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Desync detected while verifying a replay.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
