//! Append-only sample recording with swap-and-drain flushing.
//!
//! The recorder is split into two halves:
//!
//! - [`AuditRecorder`] lives on the tick driver. `record` appends to a local
//!   batch with no locking. When the batch fills (or on `flush`), the whole
//!   `Vec` is swapped out with `mem::take` and sent to the collector.
//! - [`AuditCollector`] owns the [`AuditAggregate`]. It drains batches either
//!   synchronously (`drain`) or from a background worker (`spawn`) that
//!   can be stopped to hand the collector back.
//!
//! Neither side ever blocks the other on a per-sample basis.
//!
//! # Example
//!
//! ```
//! use tempo_audit::{ActionKind, AuditRecorder, RawSample, RecorderConfig};
//!
//! let (mut recorder, mut collector) = AuditRecorder::channel(RecorderConfig::default());
//!
//! recorder.sample(RawSample {
//!     kind: ActionKind::Swing,
//!     actor: 1,
//!     expected_ms: 1450,
//!     actual_ms: 1450,
//!     at_ms: 1450,
//!     resource_consumed: true,
//! });
//! recorder.flush();
//!
//! collector.drain();
//! assert_eq!(collector.aggregate().stats().get(ActionKind::Swing).count, 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::sample::{RawSample, SampleClassifier, TimingSample};
use crate::shadow::{ShadowDiff, ShadowSample};
use crate::stats::KindStats;

// =============================================================================
// Configuration
// =============================================================================

/// Recorder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Thresholds used to classify samples.
    pub classifier: SampleClassifier,
    /// Samples buffered on the tick side before an automatic swap.
    pub batch_size: usize,
    /// Raw samples retained by the collector for export and percentiles.
    pub retain_samples: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            classifier: SampleClassifier::default(),
            batch_size: 256,
            retain_samples: 10_000,
        }
    }
}

// =============================================================================
// Batches
// =============================================================================

/// Unit of transfer between recorder and collector.
#[derive(Debug, Clone)]
pub enum AuditBatch {
    /// Classified timing samples.
    Samples(Vec<TimingSample>),
    /// Shadow differential pairs.
    Shadow(Vec<ShadowSample>),
}

// =============================================================================
// Recorder (tick side)
// =============================================================================

/// Tick-side half of the audit pipeline.
#[derive(Debug)]
pub struct AuditRecorder {
    classifier: SampleClassifier,
    batch_size: usize,
    pending: Vec<TimingSample>,
    pending_shadow: Vec<ShadowSample>,
    tx: Sender<AuditBatch>,
    dropped: u64,
}

impl AuditRecorder {
    /// Creates a connected recorder/collector pair.
    #[must_use]
    pub fn channel(config: RecorderConfig) -> (AuditRecorder, AuditCollector) {
        let (tx, rx) = mpsc::channel();
        let batch_size = config.batch_size.max(1);
        let recorder = AuditRecorder {
            classifier: config.classifier,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            pending_shadow: Vec::new(),
            tx,
            dropped: 0,
        };
        let collector = AuditCollector {
            rx,
            aggregate: AuditAggregate::with_retention(config.retain_samples),
        };
        (recorder, collector)
    }

    /// Classifier in force for this recorder.
    #[must_use]
    pub fn classifier(&self) -> &SampleClassifier {
        &self.classifier
    }

    /// Appends an already-classified sample.
    ///
    /// Never blocks; a full batch is swapped out and handed to the collector.
    pub fn record(&mut self, sample: TimingSample) {
        trace!(
            kind = %sample.kind(),
            actor = sample.actor(),
            variance_ms = sample.variance_ms(),
            "timing sample"
        );
        self.pending.push(sample);
        if self.pending.len() >= self.batch_size {
            self.flush_samples();
        }
    }

    /// Classifies and records a raw measurement, returning the stored sample.
    pub fn sample(&mut self, raw: RawSample) -> TimingSample {
        let sample = self.classifier.classify(raw);
        self.record(sample);
        sample
    }

    /// Appends a shadow differential pair.
    pub fn record_shadow(&mut self, sample: ShadowSample) {
        self.pending_shadow.push(sample);
        if self.pending_shadow.len() >= self.batch_size {
            self.flush_shadow();
        }
    }

    /// Swaps out and sends everything buffered so far.
    pub fn flush(&mut self) {
        self.flush_samples();
        self.flush_shadow();
    }

    /// Samples currently buffered on the tick side.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len() + self.pending_shadow.len()
    }

    /// Samples lost because the collector had gone away.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn flush_samples(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        self.send(AuditBatch::Samples(batch));
    }

    fn flush_shadow(&mut self) {
        if self.pending_shadow.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending_shadow);
        self.send(AuditBatch::Shadow(batch));
    }

    fn send(&mut self, batch: AuditBatch) {
        if let Err(mpsc::SendError(batch)) = self.tx.send(batch) {
            let lost = match &batch {
                AuditBatch::Samples(s) => s.len(),
                AuditBatch::Shadow(s) => s.len(),
            };
            self.dropped += lost as u64;
            debug!(lost, "audit collector gone, dropping batch");
        }
    }
}

impl Drop for AuditRecorder {
    fn drop(&mut self) {
        self.flush();
    }
}

// =============================================================================
// Aggregate
// =============================================================================

/// Everything the collector has absorbed so far.
#[derive(Debug, Clone, Default)]
pub struct AuditAggregate {
    stats: KindStats,
    shadow: ShadowDiff,
    retained: VecDeque<TimingSample>,
    retain_limit: usize,
}

impl AuditAggregate {
    /// Empty aggregate retaining at most `retain_limit` raw samples.
    #[must_use]
    pub fn with_retention(retain_limit: usize) -> Self {
        Self {
            stats: KindStats::default(),
            shadow: ShadowDiff::default(),
            retained: VecDeque::with_capacity(retain_limit.min(1 << 16)),
            retain_limit,
        }
    }

    /// Folds a batch in.
    pub fn absorb(&mut self, batch: AuditBatch) {
        match batch {
            AuditBatch::Samples(samples) => {
                for sample in samples {
                    self.push(sample);
                }
            }
            AuditBatch::Shadow(pairs) => {
                for pair in &pairs {
                    self.shadow.push(pair);
                }
            }
        }
    }

    /// Folds one sample in.
    pub fn push(&mut self, sample: TimingSample) {
        self.stats.push(&sample);
        if self.retain_limit == 0 {
            return;
        }
        if self.retained.len() == self.retain_limit {
            self.retained.pop_front();
        }
        self.retained.push_back(sample);
    }

    /// Per-kind running statistics.
    #[must_use]
    pub fn stats(&self) -> &KindStats {
        &self.stats
    }

    /// Shadow differential.
    #[must_use]
    pub fn shadow(&self) -> &ShadowDiff {
        &self.shadow
    }

    /// Retained raw samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &TimingSample> {
        self.retained.iter()
    }

    /// Number of retained raw samples.
    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }
}

// =============================================================================
// Collector (flush side)
// =============================================================================

/// Receiving half of the audit pipeline.
#[derive(Debug)]
pub struct AuditCollector {
    rx: Receiver<AuditBatch>,
    aggregate: AuditAggregate,
}

impl AuditCollector {
    /// Absorbs every batch currently queued. Returns the number of batches.
    pub fn drain(&mut self) -> usize {
        self.absorb_queued().0
    }

    /// Drains the channel; the flag is false once every recorder is gone.
    fn absorb_queued(&mut self) -> (usize, bool) {
        let mut batches = 0;
        loop {
            match self.rx.try_recv() {
                Ok(batch) => {
                    self.aggregate.absorb(batch);
                    batches += 1;
                }
                Err(TryRecvError::Empty) => return (batches, true),
                Err(TryRecvError::Disconnected) => return (batches, false),
            }
        }
    }

    /// Aggregate absorbed so far.
    #[must_use]
    pub fn aggregate(&self) -> &AuditAggregate {
        &self.aggregate
    }

    /// Moves the collector onto a background flush worker.
    ///
    /// The worker wakes at least every `interval` and absorbs queued batches.
    /// It exits when [`CollectorHandle::stop`] is called or once every
    /// recorder has been dropped.
    #[must_use]
    pub fn spawn(self, interval: Duration) -> CollectorHandle {
        let shared = Arc::new(Mutex::new(Some(self)));
        let stop = Arc::new(AtomicBool::new(false));
        let worker_shared = Arc::clone(&shared);
        let worker_stop = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("tempo-audit-flush".into())
            .spawn(move || loop {
                thread::park_timeout(interval);
                let connected = lock(&worker_shared)
                    .as_mut()
                    .is_some_and(|collector| collector.absorb_queued().1);
                if !connected || worker_stop.load(Ordering::Acquire) {
                    debug!("audit flush worker stopping");
                    break;
                }
            });

        match join {
            Ok(join) => CollectorHandle {
                shared,
                stop,
                join: Some(join),
            },
            Err(err) => {
                // No thread available: snapshots still drain on demand.
                tracing::warn!(error = %err, "could not spawn audit flush worker");
                CollectorHandle {
                    shared,
                    stop,
                    join: None,
                }
            }
        }
    }
}

fn lock(shared: &Mutex<Option<AuditCollector>>) -> MutexGuard<'_, Option<AuditCollector>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a background collector.
#[derive(Debug)]
pub struct CollectorHandle {
    shared: Arc<Mutex<Option<AuditCollector>>>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Absorbs whatever is queued and clones the aggregate.
    #[must_use]
    pub fn snapshot(&self) -> AuditAggregate {
        lock(&self.shared)
            .as_mut()
            .map(|collector| {
                collector.drain();
                collector.aggregate.clone()
            })
            .unwrap_or_default()
    }

    /// Waits for the worker to finish (after all recorders are dropped) and
    /// returns the final aggregate.
    #[must_use]
    pub fn join(mut self) -> AuditAggregate {
        self.wait();
        self.snapshot()
    }

    /// Stops the worker and hands the collector back, with everything queued
    /// so far absorbed. Recorders may stay alive.
    #[must_use]
    pub fn stop(mut self) -> Option<AuditCollector> {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = &self.join {
            join.thread().unpark();
        }
        self.wait();
        let mut collector = lock(&self.shared).take()?;
        collector.drain();
        Some(collector)
    }

    fn wait(&mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("audit flush worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::ActionKind;

    fn raw(kind: ActionKind, expected_ms: u64, actual_ms: u64) -> RawSample {
        RawSample {
            kind,
            actor: 9,
            expected_ms,
            actual_ms,
            at_ms: actual_ms,
            resource_consumed: true,
        }
    }

    mod recorder_tests {
        use super::*;

        #[test]
        fn record_buffers_until_flush() {
            let (mut recorder, mut collector) = AuditRecorder::channel(RecorderConfig::default());
            recorder.sample(raw(ActionKind::Swing, 1000, 1000));
            recorder.sample(raw(ActionKind::Swing, 1000, 1050));

            assert_eq!(recorder.pending(), 2);
            assert_eq!(collector.drain(), 0);

            recorder.flush();
            assert_eq!(recorder.pending(), 0);
            assert_eq!(collector.drain(), 1);
            assert_eq!(collector.aggregate().stats().get(ActionKind::Swing).count, 2);
        }

        #[test]
        fn full_batch_swaps_automatically() {
            let config = RecorderConfig {
                batch_size: 2,
                ..RecorderConfig::default()
            };
            let (mut recorder, mut collector) = AuditRecorder::channel(config);
            for _ in 0..5 {
                recorder.sample(raw(ActionKind::Spell, 1500, 1500));
            }
            assert_eq!(recorder.pending(), 1);
            assert_eq!(collector.drain(), 2);
            assert_eq!(collector.aggregate().stats().get(ActionKind::Spell).count, 4);
        }

        #[test]
        fn drop_flushes_remaining() {
            let (mut recorder, mut collector) = AuditRecorder::channel(RecorderConfig::default());
            recorder.sample(raw(ActionKind::Wand, 2000, 2000));
            drop(recorder);
            collector.drain();
            assert_eq!(collector.aggregate().stats().get(ActionKind::Wand).count, 1);
        }

        #[test]
        fn dropped_collector_counts_losses() {
            let (mut recorder, collector) = AuditRecorder::channel(RecorderConfig::default());
            drop(collector);
            recorder.sample(raw(ActionKind::Swing, 1000, 1000));
            recorder.flush();
            assert_eq!(recorder.dropped(), 1);
        }

        #[test]
        fn shadow_pairs_reach_aggregate() {
            let (mut recorder, mut collector) = AuditRecorder::channel(RecorderConfig::default());
            recorder.record_shadow(ShadowSample {
                kind: ActionKind::Swing,
                actor: 1,
                engine_ms: 1450,
                native_ms: 1472,
                at_ms: 0,
            });
            recorder.flush();
            collector.drain();
            assert_eq!(collector.aggregate().shadow().get(ActionKind::Swing).count, 1);
        }
    }

    mod aggregate_tests {
        use super::*;

        #[test]
        fn retention_is_bounded() {
            let classifier = SampleClassifier::default();
            let mut aggregate = AuditAggregate::with_retention(3);
            for i in 0..5u64 {
                aggregate.push(classifier.classify(raw(ActionKind::Swing, 1000, 1000 + i)));
            }
            assert_eq!(aggregate.retained_len(), 3);
            assert_eq!(aggregate.stats().get(ActionKind::Swing).count, 5);
            let first = aggregate.samples().next().unwrap();
            assert_eq!(first.variance_ms(), 2);
        }

        #[test]
        fn zero_retention_keeps_stats_only() {
            let classifier = SampleClassifier::default();
            let mut aggregate = AuditAggregate::with_retention(0);
            aggregate.push(classifier.classify(raw(ActionKind::Bandage, 5000, 5000)));
            assert_eq!(aggregate.retained_len(), 0);
            assert_eq!(aggregate.stats().total().count, 1);
        }
    }

    mod worker_tests {
        use super::*;

        #[test]
        fn background_worker_absorbs_and_joins() {
            let (mut recorder, collector) = AuditRecorder::channel(RecorderConfig::default());
            let handle = collector.spawn(Duration::from_millis(5));

            for _ in 0..10 {
                recorder.sample(raw(ActionKind::Swing, 1000, 1000));
            }
            drop(recorder);

            let aggregate = handle.join();
            assert_eq!(aggregate.stats().get(ActionKind::Swing).count, 10);
        }

        #[test]
        fn snapshot_drains_while_recorder_lives() {
            let (mut recorder, collector) = AuditRecorder::channel(RecorderConfig::default());
            let handle = collector.spawn(Duration::from_secs(60));

            for _ in 0..3 {
                recorder.sample(raw(ActionKind::Wand, 1000, 1000));
            }
            recorder.flush();

            assert_eq!(handle.snapshot().stats().get(ActionKind::Wand).count, 3);
        }

        #[test]
        fn stop_returns_collector_with_recorder_alive() {
            let (mut recorder, collector) = AuditRecorder::channel(RecorderConfig::default());
            let handle = collector.spawn(Duration::from_secs(60));

            recorder.sample(raw(ActionKind::Bandage, 5000, 5000));
            recorder.flush();

            let mut collector = handle.stop().unwrap();
            assert_eq!(collector.aggregate().stats().get(ActionKind::Bandage).count, 1);

            recorder.sample(raw(ActionKind::Bandage, 5000, 5000));
            recorder.flush();
            collector.drain();
            assert_eq!(collector.aggregate().stats().get(ActionKind::Bandage).count, 2);
        }

        #[test]
        fn worker_keeps_retention_bounded() {
            let config = RecorderConfig {
                batch_size: 4,
                retain_samples: 16,
                ..RecorderConfig::default()
            };
            let (mut recorder, collector) = AuditRecorder::channel(config);
            let handle = collector.spawn(Duration::from_millis(1));

            for _ in 0..1_000 {
                recorder.sample(raw(ActionKind::Swing, 1000, 1000));
            }
            recorder.flush();

            let aggregate = handle.snapshot();
            assert_eq!(aggregate.stats().get(ActionKind::Swing).count, 1_000);
            assert_eq!(aggregate.retained_len(), 16);
        }
    }
}
