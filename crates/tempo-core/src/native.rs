//! Host-native timing, for shadow comparison.
//!
//! In shadow mode every accepted action is also timed by a [`NativeTiming`]
//! implementation and the pair is recorded. The native result never affects
//! gameplay.

use std::sync::Arc;

use crate::action::ActionDescriptor;
use crate::actor::ActorStats;
use crate::formula::unquantized_delay_ms;
use crate::table::TimingTable;

/// The host's own delay computation.
pub trait NativeTiming: Send + Sync {
    /// Delay the native path would apply, or `None` if it has no opinion.
    fn native_delay_ms(&self, action: &ActionDescriptor, stats: &ActorStats) -> Option<u64>;
}

/// Model of a per-character millisecond timer: same table, no tick quantization.
#[derive(Debug, Clone)]
pub struct MillisecondTimerModel {
    table: Arc<TimingTable>,
}

impl MillisecondTimerModel {
    /// Model over `table`.
    #[must_use]
    pub fn new(table: Arc<TimingTable>) -> Self {
        Self { table }
    }
}

impl NativeTiming for MillisecondTimerModel {
    fn native_delay_ms(&self, action: &ActionDescriptor, stats: &ActorStats) -> Option<u64> {
        let entry = self.table.get(action.entry).filter(|e| e.kind == action.kind)?;
        Some(unquantized_delay_ms(entry, action.form, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_model_is_unquantized() {
        let model = MillisecondTimerModel::new(Arc::new(TimingTable::compat()));
        let stats = ActorStats { dex: 125, int: 100 };
        assert_eq!(model.native_delay_ms(&ActionDescriptor::swing(3), &stats), Some(1472));
        assert_eq!(model.native_delay_ms(&ActionDescriptor::swing(9_999), &stats), None);
    }
}
