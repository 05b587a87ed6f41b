//! Reconciliation between the local store and the remote backend

pub mod orchestrator;
pub mod queue;
pub mod resolver;

pub use orchestrator::{BatchSummary, SyncAction, SyncOrchestrator, SyncReport};
pub use queue::{PendingSyncQueue, ProcessSummary, RecordOutcome};
pub use resolver::{decide, decide_with_window, SyncDecision};
