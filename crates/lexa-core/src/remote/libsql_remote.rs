//! libSQL-backed remote store and statistics ledger

use std::path::Path;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use libsql::{params, Connection, Row};
use tokio::sync::Mutex;

use super::{RemoteStore, StatsLedger, FROZEN_DATE_MESSAGE};
use crate::clock::Clock;
use crate::config::DEFAULT_REFERENCE_OFFSET_HOURS;
use crate::db::Database;
use crate::models::{
    DailyStatsRecord, LedgerReceipt, Session, SessionId, StatsConflict, StatsSubmission,
    TestRecord, WordId, WordRecord,
};
use crate::util::{date_in_offset, day_bounds_millis, fixed_offset_hours};
use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SESSION_COLUMNS: &str = "id, word_count, target_count, library_tag, deleted, created_at";
const WORD_COLUMNS: &str = "id, session_id, text, correct, tested, error_count, best_time_ms, \
     last_tested, phonetic, audio_url, definitions, tags, deleted, created_at";
const STATS_COLUMNS: &str =
    "user_id, date, total_count, correct_count, total_points, version, is_frozen, updated_at";

/// Remote store implemented on a libSQL database.
///
/// Mirrors the backend schema and enforces the ledger rules itself, so the
/// sync engine can run against a file on disk or an in-memory database.
#[derive(Clone)]
pub struct LibSqlRemote {
    db: Arc<Mutex<Database>>,
    clock: Clock,
    reference_offset: FixedOffset,
}

impl LibSqlRemote {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::from_database(Database::open(path).await?))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory().await?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            clock: Clock::system(),
            reference_offset: fixed_offset_hours(DEFAULT_REFERENCE_OFFSET_HOURS),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_reference_offset_hours(mut self, hours: i32) -> Self {
        self.reference_offset = fixed_offset_hours(hours);
        self
    }

    /// "Today" in the ledger's reference timezone
    pub fn today(&self) -> NaiveDate {
        date_in_offset(self.clock.now_millis(), self.reference_offset)
    }

    /// Number of word rows stored for a session, soft-deleted ones included
    pub async fn count_word_rows(&self, user_id: &str, session_id: &SessionId) -> Result<i64> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT COUNT(*) FROM words WHERE user_id = ? AND session_id = ?",
                params![user_id, session_id.as_str()],
            )
            .await?;
        Ok(match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        })
    }

    /// Version conflicts logged for a user, newest first
    pub async fn stats_conflicts(&self, user_id: &str) -> Result<Vec<StatsConflict>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT id, user_id, date, expected_version, actual_version, payload, logged_at
                 FROM stats_conflicts
                 WHERE user_id = ?
                 ORDER BY logged_at DESC, id DESC",
                params![user_id],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(StatsConflict {
                id: row.get(0)?,
                user_id: row.get(1)?,
                date: parse_date(&row.get::<String>(2)?)?,
                expected_version: row.get(3)?,
                actual_version: row.get(4)?,
                payload: row.get(5)?,
                logged_at: row.get(6)?,
            });
        }
        Ok(conflicts)
    }

    /// Raw records appended for a date, oldest first
    pub async fn test_records(&self, user_id: &str, date: NaiveDate) -> Result<Vec<TestRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT user_id, test_date, test_count, correct_count, points, timezone_offset
                 FROM daily_test_records
                 WHERE user_id = ? AND test_date = ?
                 ORDER BY id",
                params![user_id, format_date(date)],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(TestRecord {
                user_id: row.get(0)?,
                test_date: parse_date(&row.get::<String>(1)?)?,
                test_count: row.get(2)?,
                correct_count: row.get(3)?,
                points: row.get(4)?,
                timezone_offset: i32::try_from(row.get::<i64>(5)?).map_err(|_| {
                    Error::Corrupted("timezone offset out of range".to_string())
                })?,
            });
        }
        Ok(records)
    }

    /// Freeze every date of `user_id` strictly before today.
    pub async fn freeze_past_days(&self, user_id: &str) -> Result<u64> {
        let db = self.db.lock().await;
        freeze_before(db.connection(), user_id, self.today(), self.clock.now_millis()).await
    }

    async fn record_in_transaction(
        &self,
        conn: &Connection,
        user_id: &str,
        submission: &StatsSubmission,
    ) -> Result<LedgerReceipt> {
        let now = self.clock.now_millis();
        let today = self.today();
        let date = submission.test_date.unwrap_or(today);
        if date < today {
            return Err(Error::FrozenDate(date));
        }

        let current = fetch_daily_stats(conn, user_id, date).await?;
        if current.as_ref().is_some_and(|stats| stats.is_frozen) {
            return Err(Error::FrozenDate(date));
        }
        let current_version = current.as_ref().map_or(0, |stats| stats.version);

        let conflict_detected = submission
            .expected_version
            .is_some_and(|expected| expected != current_version);
        if let Some(expected) = submission.expected_version.filter(|_| conflict_detected) {
            tracing::warn!(
                "Stats version conflict for user {} on {}: expected {}, found {}; merging additively",
                user_id,
                date,
                expected,
                current_version
            );
            conn.execute(
                "INSERT INTO stats_conflicts
                 (user_id, date, expected_version, actual_version, payload, logged_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    user_id,
                    format_date(date),
                    expected,
                    current_version,
                    serde_json::to_string(submission)?,
                    now
                ],
            )
            .await?;
        }

        let record = TestRecord {
            user_id: user_id.to_string(),
            test_date: date,
            test_count: i64::from(submission.test_count),
            correct_count: i64::from(submission.correct_count),
            points: submission.points,
            timezone_offset: submission
                .timezone_offset
                .unwrap_or_else(|| self.reference_offset.local_minus_utc() / 3600),
        };
        insert_test_record(conn, &record, now).await?;

        // aggregate is always rebuilt from the raw records
        let (total_count, correct_count, total_points) =
            sum_test_records(conn, user_id, date).await?;
        let version = current_version + 1;
        conn.execute(
            "INSERT INTO daily_stats
             (user_id, date, total_count, correct_count, total_points, version, is_frozen, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT(user_id, date) DO UPDATE SET
                 total_count = excluded.total_count,
                 correct_count = excluded.correct_count,
                 total_points = excluded.total_points,
                 version = excluded.version,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                format_date(date),
                total_count,
                correct_count,
                total_points,
                version,
                now
            ],
        )
        .await?;

        let unique_words = count_unique_words(conn, user_id, date, self.reference_offset).await?;

        Ok(LedgerReceipt {
            date,
            total_count,
            correct_count,
            total_points,
            unique_words,
            version,
            conflict_detected,
        })
    }
}

impl RemoteStore for LibSqlRemote {
    async fn fetch_session(&self, user_id: &str, id: &SessionId) -> Result<Option<Session>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ? AND user_id = ?"),
                params![id.as_str(), user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(parse_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_session(&self, user_id: &str, session: &Session) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO sessions
                 (id, user_id, word_count, target_count, library_tag, deleted, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id, user_id) DO UPDATE SET
                     word_count = excluded.word_count,
                     target_count = excluded.target_count,
                     library_tag = excluded.library_tag,
                     deleted = excluded.deleted,
                     created_at = excluded.created_at",
                params![
                    session.id.as_str(),
                    user_id,
                    i64::from(session.word_count),
                    i64::from(session.target_count),
                    session.library_tag.as_str(),
                    i64::from(session.deleted),
                    session.timestamp
                ],
            )
            .await?;
        Ok(())
    }

    async fn fetch_words(&self, user_id: &str, session_id: &SessionId) -> Result<Vec<WordRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!(
                    "SELECT {WORD_COLUMNS} FROM words
                     WHERE user_id = ? AND session_id = ? AND deleted = 0
                     ORDER BY created_at, id"
                ),
                params![user_id, session_id.as_str()],
            )
            .await?;

        let mut words = Vec::new();
        while let Some(row) = rows.next().await? {
            words.push(parse_word(&row)?);
        }
        Ok(words)
    }

    async fn replace_words(&self, user_id: &str, words: &[WordRecord]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        match replace_word_rows(conn, user_id, words).await {
            Ok(()) => {
                conn.execute("COMMIT", ()).await?;
                Ok(())
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    async fn soft_delete_words(&self, user_id: &str, ids: &[WordId]) -> Result<()> {
        let db = self.db.lock().await;
        for id in ids {
            db.connection()
                .execute(
                    "UPDATE words SET deleted = 1 WHERE user_id = ? AND id = ?",
                    params![user_id, id.as_str()],
                )
                .await?;
        }
        Ok(())
    }
}

impl StatsLedger for LibSqlRemote {
    async fn record_and_sync(
        &self,
        user_id: &str,
        submission: &StatsSubmission,
    ) -> Result<LedgerReceipt> {
        if submission.correct_count > submission.test_count {
            return Err(Error::InvalidInput(format!(
                "correct_count {} exceeds test_count {}",
                submission.correct_count, submission.test_count
            )));
        }

        let db = self.db.lock().await;
        let conn = db.connection();

        // freezing commits on its own; a rejected write must not undo it
        let frozen = freeze_before(conn, user_id, self.today(), self.clock.now_millis()).await?;
        if frozen > 0 {
            tracing::info!("Froze {} past day(s) for user {}", frozen, user_id);
        }

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        match self.record_in_transaction(conn, user_id, submission).await {
            Ok(receipt) => {
                conn.execute("COMMIT", ()).await?;
                tracing::debug!(
                    "Recorded stats for user {} on {} (version {})",
                    user_id,
                    receipt.date,
                    receipt.version
                );
                Ok(receipt)
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                let date = submission.test_date.unwrap_or_else(|| self.today());
                Err(map_frozen_error(error, date))
            }
        }
    }

    async fn daily_stats(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyStatsRecord>> {
        let db = self.db.lock().await;
        fetch_daily_stats(db.connection(), user_id, date).await
    }
}

async fn replace_word_rows(conn: &Connection, user_id: &str, words: &[WordRecord]) -> Result<()> {
    for word in words {
        conn.execute(
            "DELETE FROM words WHERE user_id = ? AND id = ?",
            params![user_id, word.id.as_str()],
        )
        .await?;
    }

    for word in words {
        conn.execute(
            &format!(
                "INSERT INTO words (user_id, {WORD_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                user_id,
                word.id.as_str(),
                word.session_id.as_str(),
                word.text.as_str(),
                i64::from(word.correct),
                i64::from(word.tested),
                i64::from(word.error_count),
                word.best_time_ms,
                word.last_tested,
                word.phonetic.clone(),
                word.audio_url.clone(),
                serde_json::to_string(&word.definitions)?,
                serde_json::to_string(&word.tags)?,
                i64::from(word.deleted),
                word.created_at
            ],
        )
        .await?;
    }
    Ok(())
}

async fn freeze_before(conn: &Connection, user_id: &str, today: NaiveDate, now: i64) -> Result<u64> {
    Ok(conn
        .execute(
            "UPDATE daily_stats SET is_frozen = 1, updated_at = ?
             WHERE user_id = ? AND date < ? AND is_frozen = 0",
            params![now, user_id, format_date(today)],
        )
        .await?)
}

async fn fetch_daily_stats(
    conn: &Connection,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<DailyStatsRecord>> {
    let mut rows = conn
        .query(
            &format!("SELECT {STATS_COLUMNS} FROM daily_stats WHERE user_id = ? AND date = ?"),
            params![user_id, format_date(date)],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(DailyStatsRecord {
            user_id: row.get(0)?,
            date: parse_date(&row.get::<String>(1)?)?,
            total_count: row.get(2)?,
            correct_count: row.get(3)?,
            total_points: row.get(4)?,
            version: row.get(5)?,
            is_frozen: row.get::<i64>(6)? != 0,
            updated_at: row.get(7)?,
        })),
        None => Ok(None),
    }
}

async fn insert_test_record(conn: &Connection, record: &TestRecord, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO daily_test_records
         (user_id, test_date, test_count, correct_count, points, timezone_offset, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            record.user_id.as_str(),
            format_date(record.test_date),
            record.test_count,
            record.correct_count,
            record.points,
            i64::from(record.timezone_offset),
            now
        ],
    )
    .await?;
    Ok(())
}

async fn sum_test_records(
    conn: &Connection,
    user_id: &str,
    date: NaiveDate,
) -> Result<(i64, i64, i64)> {
    let mut rows = conn
        .query(
            "SELECT COALESCE(SUM(test_count), 0), COALESCE(SUM(correct_count), 0), COALESCE(SUM(points), 0)
             FROM daily_test_records
             WHERE user_id = ? AND test_date = ?",
            params![user_id, format_date(date)],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        None => Ok((0, 0, 0)),
    }
}

async fn count_unique_words(
    conn: &Connection,
    user_id: &str,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<i64> {
    let (start, end) = day_bounds_millis(date, offset);
    let mut rows = conn
        .query(
            "SELECT COUNT(DISTINCT lower(text)) FROM words
             WHERE user_id = ? AND tested = 1 AND deleted = 0
               AND last_tested >= ? AND last_tested < ?",
            params![user_id, start, end],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

fn map_frozen_error(error: Error, date: NaiveDate) -> Error {
    match error {
        Error::LibSql(inner) if inner.to_string().contains(FROZEN_DATE_MESSAGE) => {
            Error::FrozenDate(date)
        }
        other => other,
    }
}

fn parse_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: parse_id(&row.get::<String>(0)?)?,
        word_count: to_u32(row.get(1)?)?,
        target_count: to_u32(row.get(2)?)?,
        library_tag: row.get(3)?,
        deleted: row.get::<i64>(4)? != 0,
        timestamp: row.get(5)?,
    })
}

fn parse_word(row: &Row) -> Result<WordRecord> {
    Ok(WordRecord {
        id: parse_id(&row.get::<String>(0)?)?,
        session_id: parse_id(&row.get::<String>(1)?)?,
        text: row.get(2)?,
        correct: row.get::<i64>(3)? != 0,
        tested: row.get::<i64>(4)? != 0,
        error_count: to_u32(row.get(5)?)?,
        best_time_ms: row.get(6)?,
        last_tested: row.get(7)?,
        phonetic: row.get(8)?,
        audio_url: row.get(9)?,
        definitions: serde_json::from_str(&row.get::<String>(10)?)?,
        tags: serde_json::from_str(&row.get::<String>(11)?)?,
        deleted: row.get::<i64>(12)? != 0,
        created_at: row.get(13)?,
    })
}

fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Database(format!("invalid id in remote row: {raw}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| Error::Database(format!("invalid date {raw}: {error}")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Database(format!("count out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use pretty_assertions::assert_eq;

    const USER: &str = "user-1";
    // 2026-02-14T04:00:00Z, noon on the 14th in UTC+8
    const FEB_14_NOON: i64 = 1_771_041_600_000;
    const DAY_MS: i64 = 86_400_000;

    async fn remote() -> (LibSqlRemote, ManualTime) {
        let (clock, time) = Clock::manual(FEB_14_NOON);
        let remote = LibSqlRemote::open_in_memory()
            .await
            .unwrap()
            .with_clock(clock);
        (remote, time)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    fn submission(tests: u32, correct: u32, points: i64, expected: Option<i64>) -> StatsSubmission {
        StatsSubmission {
            test_date: None,
            test_count: tests,
            correct_count: correct,
            points,
            timezone_offset: Some(8),
            expected_version: expected,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_appends_and_recomputes() {
        let (remote, _) = remote().await;
        assert_eq!(remote.today(), date(14));

        let first = remote
            .record_and_sync(USER, &submission(10, 8, 80, Some(0)))
            .await
            .unwrap();
        assert_eq!(first.date, date(14));
        assert_eq!(first.version, 1);
        assert!(!first.conflict_detected);

        let second = remote
            .record_and_sync(USER, &submission(5, 5, 50, Some(1)))
            .await
            .unwrap();
        assert_eq!(second.total_count, 15);
        assert_eq!(second.correct_count, 13);
        assert_eq!(second.total_points, 130);
        assert_eq!(second.version, 2);
        assert!(!second.conflict_detected);

        let records = remote.test_records(USER, date(14)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].test_count, 10);
        assert_eq!(records[1].points, 50);
        assert!(records.iter().all(|record| record.timezone_offset == 8));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_version_merges_additively_and_is_audited() {
        let (remote, _) = remote().await;
        remote
            .record_and_sync(USER, &submission(10, 8, 80, Some(0)))
            .await
            .unwrap();
        remote
            .record_and_sync(USER, &submission(4, 2, 20, Some(1)))
            .await
            .unwrap();

        // computed against version 1, stored version is 2
        let receipt = remote
            .record_and_sync(USER, &submission(6, 6, 60, Some(1)))
            .await
            .unwrap();
        assert!(receipt.conflict_detected);
        assert_eq!(receipt.total_count, 20);
        assert_eq!(receipt.correct_count, 16);
        assert_eq!(receipt.total_points, 160);
        assert_eq!(receipt.version, 3);

        let conflicts = remote.stats_conflicts(USER).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].date, date(14));
        assert_eq!(conflicts[0].expected_version, 1);
        assert_eq!(conflicts[0].actual_version, 2);
        assert!(conflicts[0].payload.contains("\"points\":60"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn past_days_freeze_and_reject_writes() {
        let (remote, time) = remote().await;
        remote
            .record_and_sync(USER, &submission(3, 3, 30, None))
            .await
            .unwrap();

        time.advance(DAY_MS);
        assert_eq!(remote.today(), date(15));

        let mut late = submission(1, 1, 10, None);
        late.test_date = Some(date(14));
        let error = remote.record_and_sync(USER, &late).await.unwrap_err();
        assert!(matches!(error, Error::FrozenDate(day) if day == date(14)));

        let frozen = remote.daily_stats(USER, date(14)).await.unwrap().unwrap();
        assert!(frozen.is_frozen);
        assert_eq!(frozen.total_count, 3);
        assert_eq!(frozen.total_points, 30);

        // still rejected on every later attempt, totals untouched
        let error = remote.record_and_sync(USER, &late).await.unwrap_err();
        assert!(error.is_frozen_date());
        let again = remote.daily_stats(USER, date(14)).await.unwrap().unwrap();
        assert_eq!(again, frozen);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn past_date_without_record_is_rejected() {
        let (remote, _) = remote().await;
        let mut late = submission(1, 1, 10, None);
        late.test_date = Some(date(10));
        let error = remote.record_and_sync(USER, &late).await.unwrap_err();
        assert!(error.is_frozen_date());
        assert!(remote.daily_stats(USER, date(10)).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn freeze_is_per_user() {
        let (remote, time) = remote().await;
        remote
            .record_and_sync("other", &submission(1, 1, 1, None))
            .await
            .unwrap();
        time.advance(DAY_MS);
        remote
            .record_and_sync(USER, &submission(1, 1, 1, None))
            .await
            .unwrap();

        let other = remote.daily_stats("other", date(14)).await.unwrap().unwrap();
        assert!(!other.is_frozen);
        assert_eq!(remote.freeze_past_days("other").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_more_correct_than_tested() {
        let (remote, _) = remote().await;
        let error = remote
            .record_and_sync(USER, &submission(1, 2, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unique_words_counts_todays_tested_words() {
        let (remote, _) = remote().await;
        let session = Session::new("toefl", 3);
        let mut words: Vec<WordRecord> = ["Apple", "apple", "pear", "kiwi"]
            .iter()
            .map(|text| WordRecord::new(session.id, *text))
            .collect();
        words[0].record_attempt(true, 1_000, FEB_14_NOON);
        words[1].record_attempt(false, 1_000, FEB_14_NOON);
        words[2].record_attempt(true, 1_000, FEB_14_NOON - DAY_MS);
        remote.upsert_session(USER, &session).await.unwrap();
        remote.replace_words(USER, &words).await.unwrap();

        let receipt = remote
            .record_and_sync(USER, &submission(2, 1, 10, None))
            .await
            .unwrap();
        assert_eq!(receipt.unique_words, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replace_words_is_idempotent() {
        let (remote, _) = remote().await;
        let session = Session::new("toefl", 2);
        let mut words = vec![
            WordRecord::new(session.id, "apple"),
            WordRecord::new(session.id, "pear"),
        ];
        words[1].created_at = words[0].created_at + 1;
        remote.upsert_session(USER, &session).await.unwrap();
        remote.replace_words(USER, &words).await.unwrap();
        remote.replace_words(USER, &words).await.unwrap();

        assert_eq!(remote.count_word_rows(USER, &session.id).await.unwrap(), 2);
        assert_eq!(remote.fetch_words(USER, &session.id).await.unwrap(), words);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn soft_deleted_words_are_hidden_but_kept() {
        let (remote, _) = remote().await;
        let session = Session::new("toefl", 2);
        let words = vec![
            WordRecord::new(session.id, "apple"),
            WordRecord::new(session.id, "pear"),
        ];
        remote.replace_words(USER, &words).await.unwrap();
        remote
            .soft_delete_words(USER, &[words[0].id])
            .await
            .unwrap();

        let live = remote.fetch_words(USER, &session.id).await.unwrap();
        assert_eq!(live, vec![words[1].clone()]);
        assert_eq!(remote.count_word_rows(USER, &session.id).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sessions_are_scoped_by_user() {
        let (remote, _) = remote().await;
        let session = Session::new("toefl", 2);
        remote.upsert_session(USER, &session).await.unwrap();

        assert_eq!(
            remote.fetch_session(USER, &session.id).await.unwrap(),
            Some(session.clone())
        );
        assert!(remote
            .fetch_session("someone-else", &session.id)
            .await
            .unwrap()
            .is_none());
    }
}
