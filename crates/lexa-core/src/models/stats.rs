//! Remote aggregation ledger models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per (user, date) aggregate kept by the remote ledger
///
/// Once `is_frozen` is set the row never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatsRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub total_count: i64,
    pub correct_count: i64,
    pub total_points: i64,
    pub version: i64,
    pub is_frozen: bool,
    /// Last change (Unix ms)
    pub updated_at: i64,
}

/// One append-only row per committed test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub user_id: String,
    pub test_date: NaiveDate,
    pub test_count: i64,
    pub correct_count: i64,
    pub points: i64,
    pub timezone_offset: i32,
}

/// Arguments of `record_test_and_sync_stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSubmission {
    /// Target date; the ledger's "today" when absent
    pub test_date: Option<NaiveDate>,
    pub test_count: u32,
    pub correct_count: u32,
    pub points: i64,
    /// Client timezone, hours east of UTC
    pub timezone_offset: Option<i32>,
    pub expected_version: Option<i64>,
}

/// Result of `record_test_and_sync_stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub date: NaiveDate,
    pub total_count: i64,
    pub correct_count: i64,
    pub total_points: i64,
    pub unique_words: i64,
    pub version: i64,
    pub conflict_detected: bool,
}

/// Audit row written when a submission carried a stale version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConflict {
    pub id: i64,
    pub user_id: String,
    pub date: NaiveDate,
    pub expected_version: i64,
    pub actual_version: i64,
    /// Submitted payload as JSON
    pub payload: String,
    /// Log timestamp (Unix ms)
    pub logged_at: i64,
}
