//! Word record model

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::SessionId;

/// A unique identifier for a word record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordId(Uuid);

impl WordId {
    /// Create a new unique word ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for WordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A single vocabulary entry with its accumulated test history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    pub id: WordId,
    pub session_id: SessionId,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub tested: bool,
    #[serde(default)]
    pub error_count: u32,
    /// Fastest correct answer (ms)
    #[serde(default)]
    pub best_time_ms: Option<i64>,
    /// Last attempt (Unix ms)
    #[serde(default)]
    pub last_tested: Option<i64>,
    #[serde(default)]
    pub phonetic: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub definitions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl WordRecord {
    /// Create an untested word belonging to `session_id`
    #[must_use]
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            id: WordId::new(),
            session_id,
            text: text.into(),
            correct: false,
            tested: false,
            error_count: 0,
            best_time_ms: None,
            last_tested: None,
            phonetic: None,
            audio_url: None,
            definitions: Vec::new(),
            tags: Vec::new(),
            deleted: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Fold one test attempt into the record.
    pub fn record_attempt(&mut self, correct: bool, elapsed_ms: i64, at: i64) {
        self.tested = true;
        self.correct = correct;
        self.last_tested = Some(at);
        if correct {
            self.best_time_ms = Some(
                self.best_time_ms
                    .map_or(elapsed_ms, |best| best.min(elapsed_ms)),
            );
        } else {
            self.error_count = self.error_count.saturating_add(1);
        }
    }
}

/// Hash of a word list's observable test content.
///
/// Words are ordered by text so the hash does not depend on storage order;
/// each contributes its text and correctness flag.
#[must_use]
pub fn content_hash(words: &[WordRecord]) -> String {
    let mut sorted: Vec<&WordRecord> = words.iter().collect();
    sorted.sort_by(|a, b| a.text.cmp(&b.text).then(a.correct.cmp(&b.correct)));

    let mut hasher = Sha256::new();
    for word in sorted {
        hasher.update(word.text.as_bytes());
        hasher.update(if word.correct { b"1" } else { b"0" });
        hasher.update([0u8]);
    }
    format!("sha256:{:x}", hasher.finalize())
}
