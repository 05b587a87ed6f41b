//! Conflict resolver: decides which copy of a session wins

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CONCURRENCY_WINDOW_MS;
use crate::models::{content_hash, Session, WordRecord};

/// Outcome of comparing the local and remote copy of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDecision {
    /// Local copy wins; push it to the remote store
    Local,
    /// Remote copy wins; pull it into the local store
    Remote,
    /// Both copies carry the same content
    Equal,
    /// Cannot be merged without losing data; ask the user
    Conflict,
}

impl SyncDecision {
    /// The same decision seen from the other side
    #[must_use]
    pub const fn mirrored(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
            Self::Equal => Self::Equal,
            Self::Conflict => Self::Conflict,
        }
    }
}

/// Compare two copies of a session using the default 1000 ms window.
#[must_use]
pub fn decide(
    local: &Session,
    remote: &Session,
    local_words: &[WordRecord],
    remote_words: &[WordRecord],
) -> SyncDecision {
    decide_with_window(
        local,
        remote,
        local_words,
        remote_words,
        DEFAULT_CONCURRENCY_WINDOW_MS,
    )
}

/// Compare two copies of a session.
///
/// Deletions dominate. Edits closer than `window_ms` are simultaneous and
/// only reconcile when their content is identical. Otherwise the newer side
/// wins as long as it does not hold fewer words than the older one.
#[must_use]
pub fn decide_with_window(
    local: &Session,
    remote: &Session,
    local_words: &[WordRecord],
    remote_words: &[WordRecord],
    window_ms: i64,
) -> SyncDecision {
    match (local.deleted, remote.deleted) {
        (false, true) => return SyncDecision::Remote,
        (true, false) => return SyncDecision::Local,
        _ => {}
    }

    let time_delta = local.timestamp.saturating_sub(remote.timestamp);
    if time_delta.unsigned_abs() < window_ms.unsigned_abs() {
        let same_content = local_words.len() == remote_words.len()
            && content_hash(local_words) == content_hash(remote_words);
        return if same_content {
            SyncDecision::Equal
        } else {
            SyncDecision::Conflict
        };
    }

    let local_count = local_words.len();
    let remote_count = remote_words.len();
    if time_delta > 0 && local_count >= remote_count {
        SyncDecision::Local
    } else if time_delta < 0 && remote_count >= local_count {
        SyncDecision::Remote
    } else {
        SyncDecision::Conflict
    }
}
