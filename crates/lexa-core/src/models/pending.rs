//! Pending statistics delta model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Statistics produced by one completed test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    /// Date the test counts towards, in the reference timezone
    pub date: NaiveDate,
    pub test_count: u32,
    pub correct_count: u32,
    pub points: i64,
}

/// A statistics delta waiting to be committed to the remote ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub delta: StatsDelta,
    /// Ledger version the delta was computed against
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Earliest moment the next attempt may run (Unix ms)
    #[serde(default)]
    pub next_attempt_at: i64,
}

impl PendingSyncItem {
    #[must_use]
    pub fn new(delta: StatsDelta, expected_version: Option<i64>, now: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            delta,
            expected_version,
            retry_count: 0,
            last_error: None,
            enqueued_at: now,
            next_attempt_at: now,
        }
    }

    /// Whether the backoff window has elapsed at `now`
    #[must_use]
    pub const fn is_due(&self, now: i64) -> bool {
        self.next_attempt_at <= now
    }
}

/// A delta given up on after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub item: PendingSyncItem,
    /// Discard timestamp (Unix ms)
    pub discarded_at: i64,
    pub reason: String,
}

/// Current queue document format
pub const QUEUE_VERSION: u32 = 1;

/// Everything the pending queue persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDocument {
    #[serde(default)]
    pub items: Vec<PendingSyncItem>,
    #[serde(default)]
    pub dead_letters: Vec<DeadLetter>,
    #[serde(default = "default_queue_version")]
    pub version: u32,
}

const fn default_queue_version() -> u32 {
    QUEUE_VERSION
}

impl Default for QueueDocument {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            dead_letters: Vec::new(),
            version: QUEUE_VERSION,
        }
    }
}
