//! Bidirectional last-writer-wins synchronization.
//!
//! - [`merge`]: pure per-kind reconciliation plan
//! - [`SyncOrchestrator`]: applies plans for an owner across all kinds
//! - [`SyncTrigger`]: decides when to run

pub mod merge;
mod orchestrator;
mod trigger;

pub use merge::MergeAction;
pub use orchestrator::{KindReport, MigrationReport, SyncOptions, SyncOrchestrator, SyncReport};
pub use trigger::{LifecycleEvent, SyncTrigger};
