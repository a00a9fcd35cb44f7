//! Error types for the timing engine.
//!
//! Only startup and shutdown paths (table, configuration, driver thread) return
//! [`TimingError`]. The tick path never fails as a whole: data problems fall
//! back to defaults, and a failing routine yields a [`RoutineError`] that is
//! isolated to its actor channel.

use std::path::PathBuf;

use thiserror::Error;

/// Startup and configuration errors.
#[derive(Debug, Error)]
pub enum TimingError {
    /// Timing table could not be read.
    #[error("failed to read timing table {path}: {source}")]
    TableIo {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Timing table was not valid JSON.
    #[error("failed to parse timing table {path}: {source}")]
    TableParse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Two entries share a key.
    #[error("duplicate timing entry key {0}")]
    DuplicateEntry(u32),

    /// An entry's fields are inconsistent.
    #[error("invalid timing entry {key}: {reason}")]
    InvalidEntry {
        /// Offending key.
        key: u32,
        /// What is wrong with it.
        reason: String,
    },

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file was not valid JSON.
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The tick driver thread could not be started.
    #[error("failed to spawn tick driver: {0}")]
    DriverSpawn(#[source] std::io::Error),

    /// The tick driver thread panicked.
    #[error("tick driver panicked")]
    DriverPanicked,
}

/// Result alias for startup operations.
pub type TimingResult<T> = Result<T, TimingError>;

/// Fault raised by an action routine or the host while handling one channel.
///
/// Faults are logged and counted by the scheduler; they never abort a tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutineError {
    /// The host collaborator reported a failure.
    #[error("host error: {0}")]
    Host(String),

    /// The routine panicked; the payload message is kept when it was a string.
    #[error("routine panicked: {0}")]
    Panicked(String),
}
