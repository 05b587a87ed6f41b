//! Local document model

use serde::{Deserialize, Serialize};

use super::{SessionId, SessionWithSync, WordRecord};

/// Current local document format
pub const BACKUP_VERSION: u32 = 1;

/// Everything the local store persists, written as one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub sessions: Vec<SessionWithSync>,
    #[serde(default)]
    pub words: Vec<WordRecord>,
    #[serde(default = "default_backup_version")]
    pub version: u32,
}

const fn default_backup_version() -> u32 {
    BACKUP_VERSION
}

impl Default for Backup {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            words: Vec::new(),
            version: BACKUP_VERSION,
        }
    }
}

impl Backup {
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&SessionWithSync> {
        self.sessions.iter().find(|entry| entry.session.id == *id)
    }

    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut SessionWithSync> {
        self.sessions.iter_mut().find(|entry| entry.session.id == *id)
    }

    /// Words belonging to `id`, in stored order
    #[must_use]
    pub fn words_for(&self, id: &SessionId) -> Vec<WordRecord> {
        self.words
            .iter()
            .filter(|word| word.session_id == *id)
            .cloned()
            .collect()
    }

    /// Insert or replace a session together with its full word list.
    ///
    /// Existing sessions keep their position so batch passes stay in local
    /// order; new sessions are appended.
    pub fn replace_session(&mut self, entry: SessionWithSync, words: Vec<WordRecord>) {
        let id = entry.session.id;
        match self.session_mut(&id) {
            Some(existing) => *existing = entry,
            None => self.sessions.push(entry),
        }
        self.words.retain(|word| word.session_id != id);
        self.words.extend(words);
    }

    /// Drop a session and its words from the document entirely
    pub fn remove_session(&mut self, id: &SessionId) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|entry| entry.session.id != *id);
        self.words.retain(|word| word.session_id != *id);
        self.sessions.len() != before
    }
}
