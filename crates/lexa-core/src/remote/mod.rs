//! Remote store contracts and their implementations
//!
//! The sync engine talks to the backend through two narrow traits:
//! [`RemoteStore`] for the session/word mirror and [`StatsLedger`] for the
//! append-only statistics ledger. [`SupabaseRemote`] speaks PostgREST to the
//! managed backend; [`LibSqlRemote`] implements the same schema and ledger
//! rules on a libSQL database.

mod libsql_remote;
mod supabase;

pub use libsql_remote::LibSqlRemote;
pub use supabase::SupabaseRemote;

use chrono::NaiveDate;

use crate::models::{
    DailyStatsRecord, LedgerReceipt, Session, SessionId, StatsSubmission, WordId, WordRecord,
};
use crate::Result;

/// Message the ledger raises for writes to frozen dates
pub const FROZEN_DATE_MESSAGE: &str = "Cannot modify historical stats for date";

/// Remote mirror of sessions and words, keyed by (id, user).
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Fetch a session by its client id
    async fn fetch_session(&self, user_id: &str, id: &SessionId) -> Result<Option<Session>>;

    /// Insert or update a session's metadata
    async fn upsert_session(&self, user_id: &str, session: &Session) -> Result<()>;

    /// Live (not soft-deleted) words of a session
    async fn fetch_words(&self, user_id: &str, session_id: &SessionId) -> Result<Vec<WordRecord>>;

    /// Delete any rows with the batch's word ids, then insert the batch.
    ///
    /// One call is atomic; repeating it leaves exactly one row per word id.
    async fn replace_words(&self, user_id: &str, words: &[WordRecord]) -> Result<()>;

    /// Mark words deleted without removing their rows
    async fn soft_delete_words(&self, user_id: &str, ids: &[WordId]) -> Result<()>;
}

/// Remote aggregation ledger (`record_test_and_sync_stats`).
#[allow(async_fn_in_trait)]
pub trait StatsLedger {
    /// Commit one test's statistics and return the date's new aggregate.
    ///
    /// Fails with [`crate::Error::FrozenDate`] when the date is frozen.
    async fn record_and_sync(
        &self,
        user_id: &str,
        submission: &StatsSubmission,
    ) -> Result<LedgerReceipt>;

    /// Current aggregate for a date
    async fn daily_stats(&self, user_id: &str, date: NaiveDate)
        -> Result<Option<DailyStatsRecord>>;
}
