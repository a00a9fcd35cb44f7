//! Error types for the audit crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading baselines or exporting reports.
///
/// Recording itself never fails; these only surface on the diagnostic paths.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Baseline file could not be read.
    #[error("failed to read baseline {path}: {source}")]
    BaselineIo {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Baseline file was not valid JSON for [`BaselineMetrics`](crate::BaselineMetrics).
    #[error("failed to parse baseline {path}: {source}")]
    BaselineParse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Report could not be serialized.
    #[error("failed to serialize audit report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
