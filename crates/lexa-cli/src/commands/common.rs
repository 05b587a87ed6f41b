use std::env;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use lexa_core::models::{
    Backup, DailyStatsRecord, LedgerReceipt, QueueDocument, Session, SessionId, SessionWithSync,
    StatsSubmission, WordId, WordRecord,
};
use lexa_core::remote::{LibSqlRemote, RemoteStore, StatsLedger, SupabaseRemote};
use lexa_core::store::{DocumentStore, JsonFileStore, LocalStore, StoreQuota};
use lexa_core::util::date_in_offset;
use lexa_core::{Error, PendingSyncQueue, RemoteConfig, SyncOrchestrator, SyncSettings};
use serde::Serialize;

use crate::error::CliError;

const ENV_DATA_DIR: &str = "LEXA_DATA_DIR";
const ENV_USER_ID: &str = "LEXA_USER_ID";
const ENV_REMOTE_DB: &str = "LEXA_REMOTE_DB";

const BACKUP_FILE: &str = "backup.json";
const QUEUE_FILE: &str = "queue.json";
const SETTINGS_FILE: &str = "settings.json";

pub type LocalBackupStore = JsonFileStore<Backup>;
pub type QueueStore = JsonFileStore<QueueDocument>;

/// Resolved locations and settings for one CLI invocation
#[derive(Debug, Clone)]
pub struct AppContext {
    pub data_dir: PathBuf,
    pub user_id: Option<String>,
    pub remote_db: Option<PathBuf>,
    pub settings: SyncSettings,
}

impl AppContext {
    /// Fill unset options from the environment and load settings.
    pub fn resolve(
        data_dir: Option<PathBuf>,
        user_id: Option<String>,
        remote_db: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let data_dir = data_dir
            .or_else(|| env::var_os(ENV_DATA_DIR).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        let user_id = user_id.or_else(|| env::var(ENV_USER_ID).ok());
        let remote_db = remote_db.or_else(|| env::var_os(ENV_REMOTE_DB).map(PathBuf::from));
        Self::new(data_dir, user_id, remote_db)
    }

    pub fn new(
        data_dir: PathBuf,
        user_id: Option<String>,
        remote_db: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        ensure_data_dir(&data_dir)?;
        let settings = SyncSettings::load_from_path(&data_dir.join(SETTINGS_FILE))?;
        let user_id = user_id
            .map(|user_id| user_id.trim().to_string())
            .filter(|user_id| !user_id.is_empty());
        Ok(Self {
            data_dir,
            user_id,
            remote_db,
            settings,
        })
    }

    pub fn user_id(&self) -> Result<&str, CliError> {
        self.user_id.as_deref().ok_or(CliError::MissingUser)
    }

    pub fn local_store(&self) -> LocalStore<LocalBackupStore> {
        let mut store = JsonFileStore::new(self.data_dir.join(BACKUP_FILE));
        if let Some(max_bytes) = self.settings.local_quota_bytes {
            store = store.with_quota(StoreQuota::new(max_bytes));
        }
        LocalStore::new(store)
    }

    pub fn queue_store(&self) -> QueueStore {
        JsonFileStore::new(self.data_dir.join(QUEUE_FILE))
    }

    /// Open the configured remote store.
    pub async fn remote(&self) -> Result<Remote, CliError> {
        if let Some(path) = &self.remote_db {
            let remote = LibSqlRemote::open(path)
                .await?
                .with_reference_offset_hours(self.settings.reference_offset_hours);
            tracing::debug!("Using libSQL remote at {}", path.display());
            return Ok(Remote::LibSql(remote));
        }

        let config = RemoteConfig::from_env()?.ok_or(CliError::RemoteNotConfigured)?;
        Ok(Remote::Supabase(SupabaseRemote::new(config)?))
    }

    pub async fn orchestrator(
        &self,
    ) -> Result<SyncOrchestrator<Remote, LocalBackupStore>, CliError> {
        Ok(SyncOrchestrator::new(self.remote().await?, self.local_store())
            .with_settings(self.settings.clone()))
    }

    pub async fn queue(&self) -> Result<PendingSyncQueue<Remote, QueueStore>, CliError> {
        let user_id = self.user_id()?;
        Ok(
            PendingSyncQueue::new(self.remote().await?, self.queue_store(), user_id)
                .with_settings(self.settings.clone()),
        )
    }

    /// Queue for document-only operations; needs no remote store
    pub fn detached_queue(&self) -> Result<PendingSyncQueue<(), QueueStore>, CliError> {
        let user_id = self.user_id()?;
        Ok(PendingSyncQueue::detached(self.queue_store(), user_id)
            .with_settings(self.settings.clone()))
    }

    /// Queue contents without contacting the remote store
    pub async fn queue_document(&self) -> Result<QueueDocument, CliError> {
        match self.queue_store().load().await {
            Ok(document) => Ok(document.unwrap_or_default()),
            Err(Error::Corrupted(reason)) => {
                tracing::warn!("Ignoring corrupted sync queue: {}", reason);
                Ok(QueueDocument::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// "Today" in the ledger's reference timezone
    pub fn today(&self) -> NaiveDate {
        date_in_offset(
            Utc::now().timestamp_millis(),
            self.settings.reference_offset(),
        )
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexa")
}

/// Remote backend selected at runtime
#[derive(Clone)]
pub enum Remote {
    Supabase(SupabaseRemote),
    LibSql(LibSqlRemote),
}

impl RemoteStore for Remote {
    async fn fetch_session(
        &self,
        user_id: &str,
        id: &SessionId,
    ) -> lexa_core::Result<Option<Session>> {
        match self {
            Self::Supabase(remote) => remote.fetch_session(user_id, id).await,
            Self::LibSql(remote) => remote.fetch_session(user_id, id).await,
        }
    }

    async fn upsert_session(&self, user_id: &str, session: &Session) -> lexa_core::Result<()> {
        match self {
            Self::Supabase(remote) => remote.upsert_session(user_id, session).await,
            Self::LibSql(remote) => remote.upsert_session(user_id, session).await,
        }
    }

    async fn fetch_words(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> lexa_core::Result<Vec<WordRecord>> {
        match self {
            Self::Supabase(remote) => remote.fetch_words(user_id, session_id).await,
            Self::LibSql(remote) => remote.fetch_words(user_id, session_id).await,
        }
    }

    async fn replace_words(&self, user_id: &str, words: &[WordRecord]) -> lexa_core::Result<()> {
        match self {
            Self::Supabase(remote) => remote.replace_words(user_id, words).await,
            Self::LibSql(remote) => remote.replace_words(user_id, words).await,
        }
    }

    async fn soft_delete_words(&self, user_id: &str, ids: &[WordId]) -> lexa_core::Result<()> {
        match self {
            Self::Supabase(remote) => remote.soft_delete_words(user_id, ids).await,
            Self::LibSql(remote) => remote.soft_delete_words(user_id, ids).await,
        }
    }
}

impl StatsLedger for Remote {
    async fn record_and_sync(
        &self,
        user_id: &str,
        submission: &StatsSubmission,
    ) -> lexa_core::Result<LedgerReceipt> {
        match self {
            Self::Supabase(remote) => remote.record_and_sync(user_id, submission).await,
            Self::LibSql(remote) => remote.record_and_sync(user_id, submission).await,
        }
    }

    async fn daily_stats(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> lexa_core::Result<Option<DailyStatsRecord>> {
        match self {
            Self::Supabase(remote) => remote.daily_stats(user_id, date).await,
            Self::LibSql(remote) => remote.daily_stats(user_id, date).await,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListItem {
    pub id: String,
    pub library_tag: String,
    pub word_count: u32,
    pub target_count: u32,
    pub sync_status: String,
    pub deleted: bool,
    pub timestamp: i64,
    pub relative_time: String,
    pub last_sync_attempt: Option<i64>,
}

pub fn session_to_list_item(entry: &SessionWithSync, now_ms: i64) -> SessionListItem {
    SessionListItem {
        id: entry.session.id.to_string(),
        library_tag: entry.session.library_tag.clone(),
        word_count: entry.session.word_count,
        target_count: entry.session.target_count,
        sync_status: entry.sync_status.to_string(),
        deleted: entry.session.deleted,
        timestamp: entry.session.timestamp,
        relative_time: format_relative_time(entry.session.timestamp, now_ms),
        last_sync_attempt: entry.last_sync_attempt,
    }
}

pub fn format_session_lines(sessions: &[SessionWithSync], now_ms: i64) -> Vec<String> {
    sessions
        .iter()
        .map(|entry| {
            let short_id = short_id(&entry.session.id.to_string());
            let words = format!("{}/{}", entry.session.word_count, entry.session.target_count);
            let status = if entry.session.deleted {
                format!("{} (deleted)", entry.sync_status)
            } else {
                entry.sync_status.to_string()
            };
            let relative_time = format_relative_time(entry.session.timestamp, now_ms);
            format!(
                "{short_id:<13}  {tag:<16}  {words:>7}  {status:<18}  {relative_time}",
                tag = entry.session.library_tag
            )
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn normalize_session_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySessionId)
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

/// Resolve a full session id or a unique prefix of one.
pub fn resolve_session_id(query: &str, sessions: &[SessionWithSync]) -> Result<SessionId, CliError> {
    let query = normalize_session_identifier(query)?;
    if let Ok(id) = query.parse::<SessionId>() {
        if sessions.iter().any(|entry| entry.session.id == id) {
            return Ok(id);
        }
    }

    let matching: Vec<SessionId> = sessions
        .iter()
        .map(|entry| entry.session.id)
        .filter(|id| id.to_string().starts_with(&query))
        .collect();

    match matching.as_slice() {
        [] => Err(CliError::SessionNotFound(query)),
        [id] => Ok(*id),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|id| short_id(&id.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousSessionId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Words of a new session: trimmed, blanks dropped
pub fn normalize_words(words: &[String]) -> Result<Vec<String>, CliError> {
    let words: Vec<String> = words
        .iter()
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty())
        .collect();
    if words.is_empty() {
        return Err(CliError::EmptyWords);
    }
    Ok(words)
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn ensure_data_dir(path: &Path) -> Result<(), CliError> {
    if path.exists() && !path.is_dir() {
        return Err(CliError::Config(format!(
            "data directory {} is not a directory",
            path.display()
        )));
    }
    Ok(())
}
