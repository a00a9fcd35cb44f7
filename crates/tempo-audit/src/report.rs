//! Audit report assembly and rendering.
//!
//! A report bundles per-kind summaries, the optional baseline verdict, the
//! shadow differential, tick-driver health, and a raw sample export. It
//! renders to JSON for machines and to a fixed-width table for people.

use std::fmt::{self, Write as _};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineMetrics, BaselineVerdict, VerdictStatus};
use crate::error::AuditResult;
use crate::jitter::TickHealth;
use crate::recorder::AuditAggregate;
use crate::sample::{ActionKind, TimingSample};
use crate::shadow::ShadowStats;
use crate::stats::VarianceStats;

/// Summary row for one action kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    /// Action kind.
    pub kind: ActionKind,
    /// Samples aggregated.
    pub count: u64,
    /// Mean |variance|.
    pub mean_abs_variance_ms: f64,
    /// Signed mean variance.
    pub mean_variance_ms: f64,
    /// Standard deviation of the signed variance.
    pub std_dev_ms: f64,
    /// Max |variance|.
    pub max_abs_variance_ms: u64,
    /// Median |variance| over retained samples.
    pub p50_abs_variance_ms: u64,
    /// 95th percentile |variance| over retained samples.
    pub p95_abs_variance_ms: u64,
    /// 99th percentile |variance| over retained samples.
    pub p99_abs_variance_ms: u64,
    /// Outlier count.
    pub outliers: u64,
    /// Double-fire count.
    pub double_fires: u64,
    /// Fizzle count.
    pub fizzles: u64,
}

impl KindSummary {
    fn build(kind: ActionKind, stats: &VarianceStats, retained: &[TimingSample]) -> Self {
        let mut abs: Vec<u64> = retained
            .iter()
            .filter(|s| s.kind() == kind)
            .map(|s| s.variance_ms().unsigned_abs())
            .collect();
        abs.sort_unstable();

        Self {
            kind,
            count: stats.count,
            mean_abs_variance_ms: stats.mean_abs_ms(),
            mean_variance_ms: stats.mean_ms(),
            std_dev_ms: stats.std_dev_ms(),
            max_abs_variance_ms: stats.max_abs,
            p50_abs_variance_ms: percentile(&abs, 0.50),
            p95_abs_variance_ms: percentile(&abs, 0.95),
            p99_abs_variance_ms: percentile(&abs, 0.99),
            outliers: stats.outliers,
            double_fires: stats.double_fires,
            fizzles: stats.fizzles,
        }
    }
}

/// Nearest-rank percentile of a sorted slice (0 when empty).
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Shadow row for one action kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSummary {
    /// Action kind.
    pub kind: ActionKind,
    /// Pairs compared.
    pub count: u64,
    /// Pairs that disagreed.
    pub mismatches: u64,
    /// Mean `engine - native`.
    pub mean_delta_ms: f64,
    /// Largest |delta|.
    pub max_abs_delta_ms: u64,
}

impl ShadowSummary {
    fn build(kind: ActionKind, stats: &ShadowStats) -> Self {
        Self {
            kind,
            count: stats.count,
            mismatches: stats.mismatches,
            mean_delta_ms: stats.mean_delta_ms(),
            max_abs_delta_ms: stats.max_abs_delta,
        }
    }
}

/// Complete audit report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Tick-clock time the report was built.
    pub generated_at_ms: u64,
    /// One row per kind in processing order.
    pub kinds: Vec<KindSummary>,
    /// Baseline comparison, when a baseline was supplied.
    pub baseline: Option<BaselineVerdict>,
    /// Shadow rows for kinds with at least one pair.
    pub shadow: Vec<ShadowSummary>,
    /// Tick-driver health, when supplied.
    pub tick_health: Option<TickHealth>,
    /// Raw sample export, oldest first.
    pub samples: Vec<TimingSample>,
}

impl AuditReport {
    /// Builds a report from an aggregate.
    ///
    /// Per-kind summaries (including percentile sorts over the retained
    /// samples) are computed in parallel; this never runs on the tick path.
    #[must_use]
    pub fn build(
        aggregate: &AuditAggregate,
        baseline: Option<&BaselineMetrics>,
        generated_at_ms: u64,
    ) -> Self {
        let samples: Vec<TimingSample> = aggregate.samples().copied().collect();
        let stats = aggregate.stats();

        let kinds: Vec<KindSummary> = ActionKind::ALL
            .par_iter()
            .map(|&kind| KindSummary::build(kind, stats.get(kind), &samples))
            .collect();

        let shadow = ActionKind::ALL
            .iter()
            .map(|&kind| ShadowSummary::build(kind, aggregate.shadow().get(kind)))
            .filter(|row| row.count > 0)
            .collect();

        Self {
            generated_at_ms,
            kinds,
            baseline: baseline.map(|b| b.compare(stats)),
            shadow,
            tick_health: None,
            samples,
        }
    }

    /// Attaches tick-driver health.
    #[must_use]
    pub fn with_tick_health(mut self, health: TickHealth) -> Self {
        self.tick_health = Some(health);
        self
    }

    /// Drops the raw sample export (for periodic summaries).
    #[must_use]
    pub fn without_samples(mut self) -> Self {
        self.samples.clear();
        self
    }

    /// Summary row for one kind.
    #[must_use]
    pub fn kind(&self, kind: ActionKind) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Baseline pass/fail; `None` without a baseline.
    #[must_use]
    pub fn passed(&self) -> Option<bool> {
        self.baseline.as_ref().map(|b| b.passed)
    }

    /// Pretty JSON rendering.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialize`](crate::AuditError::Serialize) if
    /// serialization fails.
    pub fn to_json(&self) -> AuditResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Raw samples as CSV, one row per sample.
    #[must_use]
    pub fn samples_csv(&self) -> String {
        let mut out = String::from("kind,actor,expected_ms,actual_ms,variance_ms,at_ms,consumed,flags\n");
        for s in &self.samples {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                s.kind(),
                s.actor(),
                s.expected_ms(),
                s.actual_ms(),
                s.variance_ms(),
                s.at_ms(),
                s.resource_consumed(),
                s.flags().bits()
            );
        }
        out
    }

    /// Fixed-width table rendering.
    #[must_use]
    pub fn to_table(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "timing audit @ {} ms", self.generated_at_ms)?;
        writeln!(
            f,
            "{:<8} {:>8} {:>9} {:>9} {:>8} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
            "kind", "count", "mean|v|", "mean v", "stddev", "max", "p95", "p99", "outl", "dbl", "fizz", "baseline"
        )?;
        for row in &self.kinds {
            let status = self
                .baseline
                .as_ref()
                .and_then(|b| b.kind(row.kind))
                .map_or(String::from("-"), |v| v.status.to_string());
            writeln!(
                f,
                "{:<8} {:>8} {:>9.2} {:>9.2} {:>8.2} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
                row.kind.as_str(),
                row.count,
                row.mean_abs_variance_ms,
                row.mean_variance_ms,
                row.std_dev_ms,
                row.max_abs_variance_ms,
                row.p95_abs_variance_ms,
                row.p99_abs_variance_ms,
                row.outliers,
                row.double_fires,
                row.fizzles,
                status
            )?;
        }

        if let Some(baseline) = &self.baseline {
            let overall = if baseline.passed { "PASS" } else { "FAIL" };
            writeln!(f, "baseline: {overall}")?;
            for verdict in baseline
                .kinds
                .iter()
                .filter(|v| v.status == VerdictStatus::Regressed)
            {
                for finding in &verdict.findings {
                    writeln!(f, "  {}: {}", verdict.kind, finding)?;
                }
            }
        }

        if !self.shadow.is_empty() {
            writeln!(f, "shadow (engine - native):")?;
            for row in &self.shadow {
                writeln!(
                    f,
                    "  {:<8} pairs={} mismatches={} mean={:.2}ms max={}ms",
                    row.kind.as_str(),
                    row.count,
                    row.mismatches,
                    row.mean_delta_ms,
                    row.max_abs_delta_ms
                )?;
            }
        }

        if let Some(health) = &self.tick_health {
            writeln!(
                f,
                "ticks={} overruns={} skipped={} p50={}us p99={}us max={}us",
                health.ticks,
                health.overruns,
                health.skipped_slots,
                health.p50_us,
                health.p99_us,
                health.max_us
            )?;
        }
        Ok(())
    }
}
