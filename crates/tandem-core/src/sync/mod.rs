//! Reconciliation orchestrator
//!
//! [`SyncEngine`] runs passes: refresh remote baselines, prune orphans, plan
//! sites then files, and execute the queue one action at a time. [`spawn`]
//! wraps an engine in a debounce driver that schedules passes from store
//! changes.

mod driver;
mod engine;
mod state;
#[cfg(test)]
mod testing;

pub use driver::{spawn, SyncHandle};
pub use engine::{EngineOptions, PassOutcome, PassReport, Preview, SkipReason, SyncEngine};
pub use state::{SyncPhase, SyncState};
