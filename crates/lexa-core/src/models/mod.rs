//! Data models for Lexa

mod backup;
mod conflict;
mod pending;
mod session;
mod stats;
mod word;

pub use backup::{Backup, BACKUP_VERSION};
pub use conflict::{ConflictChoice, ConflictSnapshot};
pub use pending::{DeadLetter, PendingSyncItem, QueueDocument, StatsDelta, QUEUE_VERSION};
pub use session::{Session, SessionId, SessionWithSync, SyncStatus};
pub use stats::{DailyStatsRecord, LedgerReceipt, StatsConflict, StatsSubmission, TestRecord};
pub use word::{content_hash, WordId, WordRecord};
