//! In-crate integration tests.
//!
//! - `helpers.rs`: scripted host, actor factories, module setup
//! - `integration.rs`: request, resolve, fire flows through the module
//! - `eviction.rs`: active-set membership over time
//! - `determinism.rs`: identical scripts give identical audit output
//! - `driver.rs`: the wall-clock driver thread with queued host calls

mod driver;
mod helpers;

// Re-export for convenience
pub use helpers::*;
