//! Sync orchestrator: reconciles local sessions with the remote store

use std::collections::HashSet;

use serde::Serialize;

use super::resolver::{decide_with_window, SyncDecision};
use crate::clock::Clock;
use crate::config::SyncSettings;
use crate::models::{
    Backup, ConflictChoice, ConflictSnapshot, Session, SessionId, SessionWithSync, SyncStatus,
    WordId, WordRecord,
};
use crate::remote::RemoteStore;
use crate::store::{DocumentStore, LocalStore};
use crate::{Error, Result};

/// What a sync attempt did with one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Remote had no copy; session and words were inserted
    Uploaded,
    /// Local copy won and replaced the remote one
    Overwritten,
    /// Remote copy won; the caller applies it locally
    Downloaded {
        session: Session,
        words: Vec<WordRecord>,
    },
    /// Both copies already agree
    Unchanged,
    /// Copies diverged; waiting for a user decision
    Conflict(Box<ConflictSnapshot>),
    /// The attempt did not complete
    Failed,
}

impl SyncAction {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Overwritten => "overwritten",
            Self::Downloaded { .. } => "downloaded",
            Self::Unchanged => "unchanged",
            Self::Conflict(_) => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Local status a session takes after this action
    const fn resulting_status(&self) -> SyncStatus {
        match self {
            Self::Uploaded | Self::Overwritten | Self::Downloaded { .. } | Self::Unchanged => {
                SyncStatus::Synced
            }
            Self::Conflict(_) => SyncStatus::Conflict,
            Self::Failed => SyncStatus::Failed,
        }
    }
}

/// Structured result of one session sync; failures are reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub session_id: SessionId,
    pub success: bool,
    pub action: SyncAction,
    pub message: String,
}

impl SyncReport {
    fn new(session_id: SessionId, action: SyncAction, message: impl Into<String>) -> Self {
        Self {
            session_id,
            success: !matches!(action, SyncAction::Failed),
            action,
            message: message.into(),
        }
    }

    fn failed(session_id: SessionId, message: impl Into<String>) -> Self {
        Self::new(session_id, SyncAction::Failed, message)
    }
}

/// Outcome of a batch pass over pending sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub synced: usize,
    pub conflicts: usize,
    pub failed: usize,
    /// Sessions edited locally while the pass ran; left pending
    pub skipped: usize,
    pub reports: Vec<SyncReport>,
}

/// Drives session reconciliation between a [`LocalStore`] and a
/// [`RemoteStore`].
///
/// Sessions are processed one at a time in local order. Remote I/O happens
/// outside the local store lock; results are folded back into the document in
/// a single write at the end of a pass.
pub struct SyncOrchestrator<R, S> {
    remote: R,
    local: LocalStore<S>,
    settings: SyncSettings,
    clock: Clock,
}

impl<R: RemoteStore, S: DocumentStore<Backup>> SyncOrchestrator<R, S> {
    pub fn new(remote: R, local: LocalStore<S>) -> Self {
        Self {
            remote,
            local,
            settings: SyncSettings::default(),
            clock: Clock::system(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub const fn local(&self) -> &LocalStore<S> {
        &self.local
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Reconcile one session with its remote copy.
    ///
    /// Does not touch the local store; a `Downloaded` report carries the
    /// remote snapshot for the caller to apply.
    pub async fn sync_session(
        &self,
        user_id: &str,
        local: &Session,
        local_words: &[WordRecord],
    ) -> SyncReport {
        match self.reconcile(user_id, local, local_words).await {
            Ok(report) => report,
            Err(error) => {
                tracing::warn!("Sync of session {} failed: {}", local.id, error);
                SyncReport::failed(local.id, error.to_string())
            }
        }
    }

    /// Sync every `pending` or `failed` session in local order.
    ///
    /// `progress(current, total, session_id)` runs before each session.
    pub async fn sync_all_pending(
        &self,
        user_id: &str,
        mut progress: impl FnMut(usize, usize, SessionId),
    ) -> Result<BatchSummary> {
        let backup = self.local.load_or_default().await?;
        let queued: Vec<&SessionWithSync> = backup
            .sessions
            .iter()
            .filter(|entry| entry.sync_status.needs_sync())
            .collect();
        let total = queued.len();
        if total == 0 {
            tracing::debug!("No sessions waiting for sync");
            return Ok(BatchSummary::default());
        }

        tracing::info!("Syncing {} pending session(s)", total);
        let mut outcomes = Vec::with_capacity(total);
        for (index, entry) in queued.into_iter().enumerate() {
            progress(index + 1, total, entry.id());
            let words = backup.words_for(&entry.id());
            let report = self.sync_session(user_id, &entry.session, &words).await;
            outcomes.push((entry.session.timestamp, report));
        }

        let attempted_at = self.clock.now_millis();
        let summary = self
            .local
            .update(|backup| {
                let mut summary = BatchSummary::default();
                for (seen_timestamp, report) in outcomes {
                    if apply_report(backup, seen_timestamp, &report, attempted_at) {
                        match report.action.resulting_status() {
                            SyncStatus::Conflict => summary.conflicts += 1,
                            SyncStatus::Failed => summary.failed += 1,
                            _ => summary.synced += 1,
                        }
                    } else {
                        summary.skipped += 1;
                    }
                    summary.reports.push(report);
                }
                Ok(summary)
            })
            .await?;

        tracing::info!(
            "Sync pass finished: {} synced, {} conflict(s), {} failed",
            summary.synced,
            summary.conflicts,
            summary.failed
        );
        Ok(summary)
    }

    /// Manually sync a single session.
    ///
    /// Sessions waiting on a conflict decision are refused.
    pub async fn sync_one(&self, user_id: &str, id: &SessionId) -> Result<SyncReport> {
        let (entry, words) = self
            .local
            .session(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;

        if entry.sync_status == SyncStatus::Conflict {
            return Ok(SyncReport::failed(
                *id,
                "session has an unresolved conflict; resolve it first",
            ));
        }

        let report = self.sync_session(user_id, &entry.session, &words).await;
        let attempted_at = self.clock.now_millis();
        let applied = self
            .local
            .update(|backup| {
                Ok(apply_report(
                    backup,
                    entry.session.timestamp,
                    &report,
                    attempted_at,
                ))
            })
            .await?;
        if !applied {
            tracing::debug!("Session {} changed during sync; left pending", id);
        }
        Ok(report)
    }

    /// Settle a conflict with the user's choice.
    pub async fn resolve_conflict(
        &self,
        user_id: &str,
        id: &SessionId,
        choice: ConflictChoice,
    ) -> Result<SyncReport> {
        let (entry, words) = self
            .local
            .session(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        let snapshot = match (entry.sync_status, entry.conflict) {
            (SyncStatus::Conflict, Some(snapshot)) => snapshot,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "session {id} has no conflict to resolve"
                )))
            }
        };

        let now = self.clock.now_millis();
        match choice {
            ConflictChoice::KeepLocal => {
                let mut session = entry.session;
                // must read as newer than the remote copy on other devices
                session.timestamp = now
                    .max(session.timestamp.saturating_add(1))
                    .max(snapshot.remote.timestamp.saturating_add(1));

                let pushed = async {
                    let remote_words = self.remote.fetch_words(user_id, id).await?;
                    self.overwrite_remote(user_id, &session, &words, &remote_words)
                        .await
                }
                .await;
                if let Err(error) = pushed {
                    tracing::warn!("Could not push local copy of session {}: {}", id, error);
                    return Ok(SyncReport::failed(*id, error.to_string()));
                }

                self.local
                    .update(|backup| {
                        let mut resolved = SessionWithSync::new(session, SyncStatus::Synced);
                        resolved.last_sync_attempt = Some(now);
                        backup.replace_session(resolved, words);
                        Ok(())
                    })
                    .await?;
                tracing::info!("Resolved conflict on session {} keeping local copy", id);
                Ok(SyncReport::new(
                    *id,
                    SyncAction::Overwritten,
                    "local copy pushed to remote",
                ))
            }
            ConflictChoice::KeepRemote => {
                // the remote may have moved on since the conflict was detected
                let fetched = async {
                    let remote = self.remote.fetch_session(user_id, id).await?;
                    let remote_words = self.remote.fetch_words(user_id, id).await?;
                    Ok::<_, Error>(remote.map(|remote| (remote, remote_words)))
                }
                .await;
                let (remote, remote_words) = match fetched {
                    Ok(Some(current)) => current,
                    Ok(None) => {
                        tracing::warn!("Remote copy of session {} is gone; conflict kept", id);
                        return Ok(SyncReport::failed(*id, "remote copy no longer exists"));
                    }
                    Err(error) => {
                        tracing::warn!("Could not fetch remote copy of session {}: {}", id, error);
                        return Ok(SyncReport::failed(*id, error.to_string()));
                    }
                };

                self.apply_download(remote.clone(), remote_words.clone())
                    .await?;
                tracing::info!("Resolved conflict on session {} keeping remote copy", id);
                Ok(SyncReport::new(
                    *id,
                    SyncAction::Downloaded {
                        session: remote,
                        words: remote_words,
                    },
                    "remote copy applied locally",
                ))
            }
        }
    }

    /// Overwrite the local entry for a downloaded remote snapshot.
    pub async fn apply_download(&self, session: Session, words: Vec<WordRecord>) -> Result<()> {
        let now = self.clock.now_millis();
        self.local
            .update(|backup| {
                apply_downloaded(backup, session, words, now);
                Ok(())
            })
            .await
    }

    async fn reconcile(
        &self,
        user_id: &str,
        local: &Session,
        local_words: &[WordRecord],
    ) -> Result<SyncReport> {
        let Some(remote) = self.remote.fetch_session(user_id, &local.id).await? else {
            self.remote.upsert_session(user_id, local).await?;
            self.push_words(user_id, local_words).await?;
            tracing::debug!("Uploaded session {} ({} words)", local.id, local_words.len());
            return Ok(SyncReport::new(
                local.id,
                SyncAction::Uploaded,
                format!("uploaded {} word(s)", local_words.len()),
            ));
        };

        let remote_words = self.remote.fetch_words(user_id, &local.id).await?;
        let live_words: Vec<WordRecord> = local_words
            .iter()
            .filter(|word| !word.deleted)
            .cloned()
            .collect();

        let decision = decide_with_window(
            local,
            &remote,
            &live_words,
            &remote_words,
            self.settings.concurrency_window_ms,
        );
        tracing::debug!("Session {} resolved as {:?}", local.id, decision);

        let report = match decision {
            SyncDecision::Local => {
                self.overwrite_remote(user_id, local, local_words, &remote_words)
                    .await?;
                SyncReport::new(local.id, SyncAction::Overwritten, "local copy pushed")
            }
            SyncDecision::Remote => SyncReport::new(
                local.id,
                SyncAction::Downloaded {
                    session: remote,
                    words: remote_words,
                },
                "remote copy is newer",
            ),
            SyncDecision::Equal => {
                SyncReport::new(local.id, SyncAction::Unchanged, "already in sync")
            }
            SyncDecision::Conflict => {
                tracing::info!("Session {} diverged; waiting for a decision", local.id);
                SyncReport::new(
                    local.id,
                    SyncAction::Conflict(Box::new(ConflictSnapshot {
                        local: local.clone(),
                        remote,
                        local_words: live_words,
                        remote_words,
                        detected_at: self.clock.now_millis(),
                    })),
                    "local and remote copies diverged",
                )
            }
        };
        Ok(report)
    }

    /// Replace the remote copy of a session with the local one.
    async fn overwrite_remote(
        &self,
        user_id: &str,
        session: &Session,
        words: &[WordRecord],
        remote_words: &[WordRecord],
    ) -> Result<()> {
        self.remote.upsert_session(user_id, session).await?;

        let local_ids: HashSet<WordId> = words.iter().map(|word| word.id).collect();
        let dropped: Vec<WordId> = remote_words
            .iter()
            .filter(|word| !local_ids.contains(&word.id))
            .map(|word| word.id)
            .collect();
        if !dropped.is_empty() {
            self.remote.soft_delete_words(user_id, &dropped).await?;
        }

        self.push_words(user_id, words).await
    }

    async fn push_words(&self, user_id: &str, words: &[WordRecord]) -> Result<()> {
        for batch in words.chunks(self.settings.word_batch_size.max(1)) {
            self.remote.replace_words(user_id, batch).await?;
        }
        Ok(())
    }
}

/// Fold a sync report into the local document.
///
/// Returns `false` when the session was edited (or removed) after it was
/// read for syncing; it then stays as it is for the next pass.
fn apply_report(
    backup: &mut Backup,
    seen_timestamp: i64,
    report: &SyncReport,
    attempted_at: i64,
) -> bool {
    let Some(entry) = backup.session_mut(&report.session_id) else {
        return false;
    };
    if entry.session.timestamp != seen_timestamp {
        return false;
    }

    entry.last_sync_attempt = Some(attempted_at);
    match &report.action {
        SyncAction::Downloaded { session, words } => {
            apply_downloaded(backup, session.clone(), words.clone(), attempted_at);
        }
        SyncAction::Conflict(snapshot) => {
            entry.sync_status = SyncStatus::Conflict;
            entry.conflict = Some(snapshot.as_ref().clone());
        }
        action => {
            entry.sync_status = action.resulting_status();
            entry.conflict = None;
        }
    }
    true
}

fn apply_downloaded(backup: &mut Backup, session: Session, words: Vec<WordRecord>, at: i64) {
    let mut entry = SessionWithSync::new(session, SyncStatus::Synced);
    entry.last_sync_attempt = Some(at);
    backup.replace_session(entry, words);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LibSqlRemote;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const USER: &str = "user-1";
    const T0: i64 = 1_771_041_600_000;

    type Orchestrator<R> = SyncOrchestrator<R, MemoryStore<Backup>>;

    async fn orchestrator() -> Orchestrator<LibSqlRemote> {
        let (clock, _) = Clock::manual(T0);
        let remote = LibSqlRemote::open_in_memory()
            .await
            .unwrap()
            .with_clock(clock.clone());
        SyncOrchestrator::new(remote, LocalStore::new(MemoryStore::new())).with_clock(clock)
    }

    fn session_at(timestamp: i64, texts: &[&str]) -> (Session, Vec<WordRecord>) {
        let mut session = Session::new("toefl", 10);
        session.timestamp = timestamp;
        let words = words_at(session.id, timestamp, texts);
        session.word_count = u32::try_from(words.len()).unwrap();
        (session, words)
    }

    fn copy_with(session: &Session, timestamp: i64, texts: &[&str]) -> (Session, Vec<WordRecord>) {
        let mut copy = session.clone();
        copy.timestamp = timestamp;
        let words = words_at(session.id, timestamp, texts);
        copy.word_count = u32::try_from(words.len()).unwrap();
        (copy, words)
    }

    // distinct creation times keep remote fetch order equal to list order
    fn words_at(session_id: SessionId, created_at: i64, texts: &[&str]) -> Vec<WordRecord> {
        (0_i64..)
            .zip(texts)
            .map(|(offset, text)| {
                let mut word = WordRecord::new(session_id, *text);
                word.created_at = created_at + offset;
                word
            })
            .collect()
    }

    async fn seed_remote(remote: &LibSqlRemote, session: &Session, words: &[WordRecord]) {
        remote.upsert_session(USER, session).await.unwrap();
        remote.replace_words(USER, words).await.unwrap();
    }

    /// Remote that fails every call
    struct OfflineRemote;

    impl RemoteStore for OfflineRemote {
        async fn fetch_session(&self, _: &str, _: &SessionId) -> Result<Option<Session>> {
            Err(offline())
        }
        async fn upsert_session(&self, _: &str, _: &Session) -> Result<()> {
            Err(offline())
        }
        async fn fetch_words(&self, _: &str, _: &SessionId) -> Result<Vec<WordRecord>> {
            Err(offline())
        }
        async fn replace_words(&self, _: &str, _: &[WordRecord]) -> Result<()> {
            Err(offline())
        }
        async fn soft_delete_words(&self, _: &str, _: &[WordId]) -> Result<()> {
            Err(offline())
        }
    }

    fn offline() -> Error {
        Error::Remote {
            status: 503,
            message: "service unavailable".to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_session_is_uploaded() {
        let orchestrator = orchestrator().await;
        let (session, words) = session_at(T0, &["apple", "pear", "kiwi"]);

        let report = orchestrator.sync_session(USER, &session, &words).await;
        assert!(report.success);
        assert_eq!(report.action, SyncAction::Uploaded);

        let remote = orchestrator.remote();
        assert_eq!(
            remote.fetch_session(USER, &session.id).await.unwrap(),
            Some(session.clone())
        );
        assert_eq!(remote.fetch_words(USER, &session.id).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_twice_keeps_one_row_per_word() {
        let orchestrator = orchestrator().await;
        let (session, words) = session_at(T0, &["apple", "pear"]);

        orchestrator.sync_session(USER, &session, &words).await;
        let second = orchestrator.sync_session(USER, &session, &words).await;
        assert_eq!(second.action, SyncAction::Unchanged);

        let rows = orchestrator
            .remote()
            .count_word_rows(USER, &session.id)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_remote_with_more_words_is_downloaded() {
        let orchestrator = orchestrator().await;
        let (local, local_words) = session_at(T0, &["apple"]);
        let (remote, remote_words) = copy_with(&local, T0 + 60_000, &["apple", "pear", "kiwi"]);
        seed_remote(orchestrator.remote(), &remote, &remote_words).await;

        let report = orchestrator.sync_session(USER, &local, &local_words).await;
        assert!(report.success);
        assert_eq!(
            report.action,
            SyncAction::Downloaded {
                session: remote,
                words: remote_words,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn near_simultaneous_divergent_edits_conflict() {
        let orchestrator = orchestrator().await;
        let (local, local_words) = session_at(T0, &["apple", "pear"]);
        let (remote, remote_words) = copy_with(&local, T0 + 500, &["apple", "kiwi"]);
        seed_remote(orchestrator.remote(), &remote, &remote_words).await;

        let report = orchestrator.sync_session(USER, &local, &local_words).await;
        let SyncAction::Conflict(snapshot) = report.action else {
            panic!("expected conflict, got {:?}", report.action);
        };
        assert_eq!(snapshot.local, local);
        assert_eq!(snapshot.remote, remote);
        assert_eq!(snapshot.local_words, local_words);
        assert_eq!(snapshot.remote_words, remote_words);
        assert_eq!(snapshot.time_delta_ms(), -500);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_local_overwrites_and_soft_deletes_dropped_words() {
        let orchestrator = orchestrator().await;
        let (remote, remote_words) = session_at(T0, &["apple", "pear"]);
        seed_remote(orchestrator.remote(), &remote, &remote_words).await;

        let mut local = remote.clone();
        local.timestamp = T0 + 5_000;
        let mut local_words = vec![remote_words[0].clone()];
        local_words.push(WordRecord::new(local.id, "kiwi"));
        local_words.push(WordRecord::new(local.id, "plum"));
        local.word_count = 3;

        let report = orchestrator.sync_session(USER, &local, &local_words).await;
        assert_eq!(report.action, SyncAction::Overwritten);

        let live = orchestrator
            .remote()
            .fetch_words(USER, &local.id)
            .await
            .unwrap();
        let mut texts: Vec<&str> = live.iter().map(|word| word.text.as_str()).collect();
        texts.sort_unstable();
        assert_eq!(texts, vec!["apple", "kiwi", "plum"]);
        assert_eq!(
            orchestrator
                .remote()
                .count_word_rows(USER, &local.id)
                .await
                .unwrap(),
            4
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overwrite_pushes_words_in_batches() {
        let settings = SyncSettings {
            word_batch_size: 2,
            ..SyncSettings::default()
        };
        let orchestrator = orchestrator().await.with_settings(settings);
        let texts = ["a", "b", "c", "d", "e"];
        let (session, words) = session_at(T0, &texts);

        orchestrator.sync_session(USER, &session, &words).await;
        assert_eq!(
            orchestrator
                .remote()
                .fetch_words(USER, &session.id)
                .await
                .unwrap()
                .len(),
            5
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_failure_is_reported_not_raised() {
        let orchestrator = SyncOrchestrator::new(OfflineRemote, LocalStore::new(MemoryStore::<Backup>::new()));
        let (session, words) = session_at(T0, &["apple"]);

        let report = orchestrator.sync_session(USER, &session, &words).await;
        assert!(!report.success);
        assert_eq!(report.action, SyncAction::Failed);
        assert!(report.message.contains("service unavailable"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_updates_statuses_and_applies_downloads() {
        let orchestrator = orchestrator().await;
        let local = orchestrator.local();

        let (fresh, fresh_words) = session_at(T0, &["apple"]);
        local
            .upsert_session(fresh.clone(), fresh_words, SyncStatus::Pending)
            .await
            .unwrap();

        let (stale, stale_words) = session_at(T0, &["pear"]);
        let (newer, newer_words) = copy_with(&stale, T0 + 60_000, &["pear", "plum"]);
        seed_remote(orchestrator.remote(), &newer, &newer_words).await;
        local
            .upsert_session(stale.clone(), stale_words, SyncStatus::Failed)
            .await
            .unwrap();

        let (done, done_words) = session_at(T0, &["fig"]);
        local
            .upsert_session(done.clone(), done_words, SyncStatus::Synced)
            .await
            .unwrap();

        let mut calls = Vec::new();
        let summary = orchestrator
            .sync_all_pending(USER, |current, total, id| calls.push((current, total, id)))
            .await
            .unwrap();

        assert_eq!(calls, vec![(1, 2, fresh.id), (2, 2, stale.id)]);
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.reports.len(), 2);

        let (entry, words) = local.session(&stale.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
        assert_eq!(entry.session, newer);
        assert_eq!(words, newer_words);
        assert_eq!(entry.last_sync_attempt, Some(T0));

        let (entry, _) = local.session(&fresh.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_marks_failures() {
        let orchestrator =
            SyncOrchestrator::new(OfflineRemote, LocalStore::new(MemoryStore::<Backup>::new()));
        let (session, words) = session_at(T0, &["apple"]);
        orchestrator
            .local()
            .upsert_session(session.clone(), words, SyncStatus::Pending)
            .await
            .unwrap();

        let summary = orchestrator.sync_all_pending(USER, |_, _, _| {}).await.unwrap();
        assert_eq!(summary.failed, 1);

        let (entry, _) = orchestrator
            .local()
            .session(&session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Failed);
        assert!(entry.last_sync_attempt.is_some());

        // failed sessions are picked up again on the next pass
        let again = orchestrator.sync_all_pending(USER, |_, _, _| {}).await.unwrap();
        assert_eq!(again.failed, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicts_block_sync_until_resolved() {
        let orchestrator = orchestrator().await;
        let (local, local_words) = session_at(T0, &["apple", "pear"]);
        let (remote, remote_words) = copy_with(&local, T0 + 200, &["apple", "kiwi"]);
        seed_remote(orchestrator.remote(), &remote, &remote_words).await;
        orchestrator
            .local()
            .upsert_session(local.clone(), local_words.clone(), SyncStatus::Pending)
            .await
            .unwrap();

        let summary = orchestrator.sync_all_pending(USER, |_, _, _| {}).await.unwrap();
        assert_eq!(summary.conflicts, 1);

        let (entry, _) = orchestrator.local().session(&local.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Conflict);
        assert!(entry.conflict.is_some());

        // neither the batch pass nor a manual sync touches it
        let summary = orchestrator.sync_all_pending(USER, |_, _, _| {}).await.unwrap();
        assert!(summary.reports.is_empty());
        let manual = orchestrator.sync_one(USER, &local.id).await.unwrap();
        assert!(!manual.success);

        let resolved = orchestrator
            .resolve_conflict(USER, &local.id, ConflictChoice::KeepLocal)
            .await
            .unwrap();
        assert_eq!(resolved.action, SyncAction::Overwritten);

        let (entry, _) = orchestrator.local().session(&local.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
        assert!(entry.conflict.is_none());

        let mut texts: Vec<String> = orchestrator
            .remote()
            .fetch_words(USER, &local.id)
            .await
            .unwrap()
            .into_iter()
            .map(|word| word.text)
            .collect();
        texts.sort_unstable();
        assert_eq!(texts, vec!["apple", "pear"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keep_remote_applies_remote_copy() {
        let orchestrator = orchestrator().await;
        let (local, local_words) = session_at(T0, &["apple", "pear"]);
        let (remote, remote_words) = copy_with(&local, T0 + 200, &["kiwi"]);
        seed_remote(orchestrator.remote(), &remote, &remote_words).await;
        orchestrator
            .local()
            .upsert_session(local.clone(), local_words, SyncStatus::Pending)
            .await
            .unwrap();
        orchestrator.sync_one(USER, &local.id).await.unwrap();

        orchestrator
            .resolve_conflict(USER, &local.id, ConflictChoice::KeepRemote)
            .await
            .unwrap();

        let (entry, words) = orchestrator.local().session(&local.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
        assert_eq!(entry.session, remote);
        assert_eq!(words, remote_words);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keep_remote_downloads_changes_made_after_detection() {
        let orchestrator = orchestrator().await;
        let (local, local_words) = session_at(T0, &["apple", "pear"]);
        let (remote, remote_words) = copy_with(&local, T0 + 200, &["kiwi"]);
        seed_remote(orchestrator.remote(), &remote, &remote_words).await;
        orchestrator
            .local()
            .upsert_session(local.clone(), local_words, SyncStatus::Pending)
            .await
            .unwrap();
        orchestrator.sync_one(USER, &local.id).await.unwrap();

        // another device edits the remote before the user decides
        let mut updated = remote.clone();
        updated.timestamp = T0 + 60_000;
        updated.word_count = 3;
        let mut updated_words = remote_words.clone();
        updated_words.extend(words_at(local.id, T0 + 60_000, &["plum", "fig"]));
        seed_remote(orchestrator.remote(), &updated, &updated_words).await;

        let report = orchestrator
            .resolve_conflict(USER, &local.id, ConflictChoice::KeepRemote)
            .await
            .unwrap();
        assert!(report.success);

        let (entry, words) = orchestrator.local().session(&local.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
        assert!(entry.conflict.is_none());
        assert_eq!(entry.session, updated);
        let texts: Vec<&str> = words.iter().map(|word| word.text.as_str()).collect();
        assert_eq!(texts, vec!["kiwi", "plum", "fig"]);

        let summary = orchestrator.sync_all_pending(USER, |_, _, _| {}).await.unwrap();
        assert!(summary.reports.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keep_remote_while_offline_keeps_the_conflict() {
        let orchestrator =
            SyncOrchestrator::new(OfflineRemote, LocalStore::new(MemoryStore::<Backup>::new()));
        let (local, local_words) = session_at(T0, &["apple"]);
        let (remote, remote_words) = copy_with(&local, T0 + 200, &["kiwi"]);
        orchestrator
            .local()
            .upsert_session(local.clone(), local_words.clone(), SyncStatus::Conflict)
            .await
            .unwrap();
        let snapshot = ConflictSnapshot {
            local: local.clone(),
            remote,
            local_words,
            remote_words,
            detected_at: T0,
        };
        orchestrator
            .local()
            .update(|backup| {
                if let Some(entry) = backup.session_mut(&local.id) {
                    entry.conflict = Some(snapshot);
                }
                Ok(())
            })
            .await
            .unwrap();

        let report = orchestrator
            .resolve_conflict(USER, &local.id, ConflictChoice::KeepRemote)
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.action, SyncAction::Failed);

        let (entry, words) = orchestrator.local().session(&local.id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Conflict);
        assert!(entry.conflict.is_some());
        assert_eq!(entry.session, local);
        assert_eq!(words.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_without_conflict_is_rejected() {
        let orchestrator = orchestrator().await;
        let (session, words) = session_at(T0, &["apple"]);
        orchestrator
            .local()
            .upsert_session(session.clone(), words, SyncStatus::Pending)
            .await
            .unwrap();

        let error = orchestrator
            .resolve_conflict(USER, &session.id, ConflictChoice::KeepLocal)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deletion_propagates_to_remote() {
        let orchestrator = orchestrator().await;
        let (session, words) = session_at(T0, &["apple"]);
        seed_remote(orchestrator.remote(), &session, &words).await;
        orchestrator
            .local()
            .upsert_session(session.clone(), words, SyncStatus::Synced)
            .await
            .unwrap();
        orchestrator.local().delete_session(&session.id).await.unwrap();

        let summary = orchestrator.sync_all_pending(USER, |_, _, _| {}).await.unwrap();
        assert_eq!(summary.synced, 1);

        let remote = orchestrator
            .remote()
            .fetch_session(USER, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert!(remote.deleted);
        assert!(orchestrator
            .remote()
            .fetch_words(USER, &session.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn stale_reports_are_not_applied() {
        let (session, words) = session_at(T0, &["apple"]);
        let mut backup = Backup::default();
        backup.replace_session(
            SessionWithSync::new(session.clone(), SyncStatus::Pending),
            words,
        );
        let report = SyncReport::new(session.id, SyncAction::Uploaded, "");

        assert!(!apply_report(&mut backup, T0 - 1, &report, T0));
        assert_eq!(backup.sessions[0].sync_status, SyncStatus::Pending);

        assert!(apply_report(&mut backup, T0, &report, T0));
        assert_eq!(backup.sessions[0].sync_status, SyncStatus::Synced);
    }
}
