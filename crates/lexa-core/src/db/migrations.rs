//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, &V1_STATEMENTS).await?;
    }
    if version < 2 {
        apply(conn, 2, &V2_STATEMENTS).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: remote entities and the append-only statistics ledger
const V1_STATEMENTS: [&str; 10] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        word_count INTEGER NOT NULL DEFAULT 0,
        target_count INTEGER NOT NULL DEFAULT 0,
        library_tag TEXT NOT NULL DEFAULT '',
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS words (
        id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        text TEXT NOT NULL,
        correct INTEGER NOT NULL DEFAULT 0,
        tested INTEGER NOT NULL DEFAULT 0,
        error_count INTEGER NOT NULL DEFAULT 0 CHECK (error_count >= 0),
        best_time_ms INTEGER,
        last_tested INTEGER,
        phonetic TEXT,
        audio_url TEXT,
        definitions TEXT NOT NULL DEFAULT '[]',
        tags TEXT NOT NULL DEFAULT '[]',
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (id, user_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_words_session ON words(user_id, session_id)",
    "CREATE INDEX IF NOT EXISTS idx_words_last_tested ON words(user_id, last_tested)",
    "CREATE TABLE IF NOT EXISTS daily_stats (
        user_id TEXT NOT NULL,
        date TEXT NOT NULL,
        total_count INTEGER NOT NULL DEFAULT 0,
        correct_count INTEGER NOT NULL DEFAULT 0,
        total_points INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        is_frozen INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, date)
    )",
    "CREATE TABLE IF NOT EXISTS daily_test_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        test_date TEXT NOT NULL,
        test_count INTEGER NOT NULL,
        correct_count INTEGER NOT NULL,
        points INTEGER NOT NULL,
        timezone_offset INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_test_records_day ON daily_test_records(user_id, test_date)",
    "CREATE INDEX IF NOT EXISTS idx_daily_stats_frozen ON daily_stats(user_id, is_frozen)",
    "INSERT INTO schema_version (version) VALUES (1)",
];

/// Version 2: freeze guards and the version-conflict audit log
const V2_STATEMENTS: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS stats_conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        date TEXT NOT NULL,
        expected_version INTEGER NOT NULL,
        actual_version INTEGER NOT NULL,
        payload TEXT NOT NULL,
        logged_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_stats_conflicts_user ON stats_conflicts(user_id, logged_at DESC)",
    "CREATE TRIGGER IF NOT EXISTS daily_stats_frozen_guard BEFORE UPDATE ON daily_stats
     FOR EACH ROW
     WHEN OLD.is_frozen = 1
     BEGIN
         SELECT RAISE(ABORT, 'Cannot modify historical stats for date');
     END",
    "CREATE TRIGGER IF NOT EXISTS daily_stats_frozen_delete_guard BEFORE DELETE ON daily_stats
     FOR EACH ROW
     WHEN OLD.is_frozen = 1
     BEGIN
         SELECT RAISE(ABORT, 'Cannot modify historical stats for date');
     END",
    "CREATE TRIGGER IF NOT EXISTS test_records_frozen_guard BEFORE INSERT ON daily_test_records
     FOR EACH ROW
     WHEN EXISTS (
         SELECT 1 FROM daily_stats
         WHERE user_id = NEW.user_id AND date = NEW.test_date AND is_frozen = 1
     )
     BEGIN
         SELECT RAISE(ABORT, 'Cannot modify historical stats for date');
     END",
    "INSERT INTO schema_version (version) VALUES (2)",
];

/// Run one migration's statements inside a transaction
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    if version == CURRENT_VERSION {
        tracing::debug!("Database schema is current");
    }
    Ok(())
}
