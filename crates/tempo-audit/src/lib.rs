//! # Tempo Audit
//!
//! Timing-accuracy audit subsystem for the Tempo action-timing engine.
//!
//! Every timed action the engine completes yields one [`TimingSample`]: the
//! delay the formula promised, the delay the scheduler delivered, and flags
//! derived from the difference. This crate collects those samples without
//! disturbing the tick driver, aggregates them per action kind, compares the
//! aggregate against a [`BaselineMetrics`] precision contract, and renders
//! reports.
//!
//! ## Pipeline
//!
//! - [`AuditRecorder`]: tick-side, append-only, swap-and-drain batches
//! - [`AuditCollector`]: drains batches into an [`AuditAggregate`], inline or
//!   on a background flush worker
//! - [`BaselineMetrics::compare`]: pass/regressed verdict per kind
//! - [`AuditReport`]: JSON, CSV sample export, fixed-width table
//!
//! Shadow-mode pairs ([`ShadowSample`]) travel the same pipeline and are kept
//! apart from the gameplay samples.
//!
//! ## Quick Start
//!
//! ```
//! use tempo_audit::{ActionKind, AuditRecorder, AuditReport, BaselineMetrics, RawSample, RecorderConfig};
//!
//! let (mut recorder, mut collector) = AuditRecorder::channel(RecorderConfig::default());
//! for actual_ms in [1450, 1450, 1500] {
//!     recorder.sample(RawSample {
//!         kind: ActionKind::Swing,
//!         actor: 1,
//!         expected_ms: 1450,
//!         actual_ms,
//!         at_ms: 0,
//!         resource_consumed: true,
//!     });
//! }
//! recorder.flush();
//! collector.drain();
//!
//! let report = AuditReport::build(collector.aggregate(), Some(&BaselineMetrics::default()), 0);
//! assert_eq!(report.passed(), Some(true));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod baseline;
pub mod error;
pub mod jitter;
pub mod recorder;
pub mod report;
pub mod sample;
pub mod shadow;
pub mod stats;

// Re-exports for convenience
pub use baseline::{BaselineMetrics, BaselineVerdict, Finding, KindThresholds, KindVerdict, Metric, VerdictStatus};
pub use error::{AuditError, AuditResult};
pub use jitter::{JitterTracker, TickHealth};
pub use recorder::{AuditAggregate, AuditBatch, AuditCollector, AuditRecorder, CollectorHandle, RecorderConfig};
pub use report::{AuditReport, KindSummary, ShadowSummary};
pub use sample::{ActionKind, RawSample, SampleClassifier, SampleFlags, TimingSample};
pub use shadow::{ShadowDiff, ShadowSample, ShadowStats};
pub use stats::{KindStats, VarianceStats};
