//! Local store: the offline source of truth for sessions and words

use tokio::sync::Mutex;

use super::DocumentStore;
use crate::models::{Backup, Session, SessionId, SessionWithSync, SyncStatus, WordRecord};
use crate::{Error, Result};

/// Durable local document holding sessions, words and their sync status.
///
/// Every mutation is a read-modify-write of the whole document; the internal
/// mutex keeps two mutations from interleaving inside one process.
pub struct LocalStore<S> {
    store: S,
    write_lock: Mutex<()>,
}

impl<S: DocumentStore<Backup>> LocalStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the backup, `None` when empty.
    ///
    /// A corrupted document is discarded with a warning and reported as
    /// empty.
    pub async fn load(&self) -> Result<Option<Backup>> {
        match self.store.load().await {
            Ok(backup) => Ok(backup),
            Err(Error::Corrupted(reason)) => {
                tracing::warn!("Discarding corrupted local backup: {}", reason);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Load the backup or start from an empty one
    pub async fn load_or_default(&self) -> Result<Backup> {
        Ok(self.load().await?.unwrap_or_default())
    }

    /// Overwrite the whole document, evicting synced sessions if needed.
    pub async fn save(&self, backup: &Backup) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut backup = backup.clone();
        self.persist(&mut backup).await
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await
    }

    /// Apply `mutate` to the current document and persist the result.
    pub async fn update<T>(&self, mutate: impl FnOnce(&mut Backup) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut backup = self.load_or_default().await?;
        let value = mutate(&mut backup)?;
        self.persist(&mut backup).await?;
        Ok(value)
    }

    /// Insert or replace a session with its full word list.
    pub async fn upsert_session(
        &self,
        session: Session,
        words: Vec<WordRecord>,
        status: SyncStatus,
    ) -> Result<()> {
        if let Some(stray) = words.iter().find(|word| word.session_id != session.id) {
            return Err(Error::InvalidInput(format!(
                "word {} belongs to session {}, not {}",
                stray.id, stray.session_id, session.id
            )));
        }

        self.update(|backup| {
            let mut entry = SessionWithSync::new(session, status);
            if let Some(existing) = backup.session(&entry.session.id) {
                entry.last_sync_attempt = existing.last_sync_attempt;
                if status == SyncStatus::Conflict {
                    entry.conflict.clone_from(&existing.conflict);
                }
            }
            backup.replace_session(entry, words);
            Ok(())
        })
        .await
    }

    /// Tombstone a session so the deletion propagates on the next sync.
    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        self.update(|backup| {
            let entry = backup
                .session_mut(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            entry.session.deleted = true;
            entry.session.touch();
            entry.sync_status = SyncStatus::Pending;
            entry.conflict = None;

            for word in backup.words.iter_mut().filter(|word| word.session_id == *id) {
                word.deleted = true;
            }
            Ok(())
        })
        .await?;
        tracing::info!("Marked session {} deleted", id);
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionWithSync>> {
        Ok(self.load_or_default().await?.sessions)
    }

    /// A session and its words
    pub async fn session(&self, id: &SessionId) -> Result<Option<(SessionWithSync, Vec<WordRecord>)>> {
        let backup = self.load_or_default().await?;
        Ok(backup
            .session(id)
            .cloned()
            .map(|entry| (entry, backup.words_for(id))))
    }

    /// Move every `failed` session back to `pending`; returns how many moved.
    pub async fn retry_failed(&self) -> Result<usize> {
        let moved = self
            .update(|backup| {
                let mut moved = 0;
                for entry in &mut backup.sessions {
                    if entry.sync_status == SyncStatus::Failed {
                        entry.sync_status = SyncStatus::Pending;
                        moved += 1;
                    }
                }
                Ok(moved)
            })
            .await?;
        if moved > 0 {
            tracing::info!("Re-queued {} failed session(s)", moved);
        }
        Ok(moved)
    }

    async fn persist(&self, backup: &mut Backup) -> Result<()> {
        loop {
            match self.store.save(backup).await {
                Err(Error::QuotaExceeded { needed, limit }) => {
                    let Some(evicted) = evict_oldest_synced(backup) else {
                        tracing::warn!(
                            "Local storage quota exceeded ({} > {} bytes) with nothing left to evict",
                            needed,
                            limit
                        );
                        return Err(Error::QuotaExceeded { needed, limit });
                    };
                    tracing::warn!(
                        "Local storage quota exceeded ({} > {} bytes); evicted synced session {}",
                        needed,
                        limit,
                        evicted
                    );
                }
                result => return result,
            }
        }
    }
}

/// Drop the oldest session whose state is fully mirrored remotely.
fn evict_oldest_synced(backup: &mut Backup) -> Option<SessionId> {
    let id = backup
        .sessions
        .iter()
        .filter(|entry| entry.sync_status == SyncStatus::Synced)
        .min_by_key(|entry| entry.session.timestamp)
        .map(SessionWithSync::id)?;
    backup.remove_session(&id);
    Some(id)
}
