//! Supabase (PostgREST) remote store client.

use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteStore, StatsLedger, FROZEN_DATE_MESSAGE};
use crate::config::{RemoteConfig, DEFAULT_REFERENCE_OFFSET_HOURS};
use crate::models::{
    DailyStatsRecord, LedgerReceipt, Session, SessionId, StatsSubmission, WordId, WordRecord,
};
use crate::util::{compact_text, date_in_offset, fixed_offset_hours, unix_millis_now};
use crate::{Error, Result};

const RECORD_STATS_RPC: &str = "record_test_and_sync_stats";

/// Remote store backed by a Supabase project.
#[derive(Clone)]
pub struct SupabaseRemote {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for SupabaseRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseRemote")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SupabaseRemote {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: reqwest::Client::builder().build()?,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.config.rest_url())
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rpc/{function}", self.config.rest_url())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.anon_key);
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }

    async fn delete_word_rows(&self, user_id: &str, words: &[WordRecord]) -> Result<()> {
        let ids: Vec<String> = words.iter().map(|word| word.id.as_str()).collect();
        self.send(
            self.client
                .delete(self.table_url("words"))
                .query(&[("user_id", eq(user_id)), ("id", in_list(&ids))]),
        )
        .await?;
        Ok(())
    }
}

impl RemoteStore for SupabaseRemote {
    async fn fetch_session(&self, user_id: &str, id: &SessionId) -> Result<Option<Session>> {
        let rows: Vec<SessionRow> = self
            .send(self.client.get(self.table_url("sessions")).query(&[
                ("id", eq(&id.as_str())),
                ("user_id", eq(user_id)),
                ("select", "*".to_string()),
            ]))
            .await?
            .json()
            .await?;
        rows.into_iter().next().map(SessionRow::into_session).transpose()
    }

    async fn upsert_session(&self, user_id: &str, session: &Session) -> Result<()> {
        self.send(
            self.client
                .post(self.table_url("sessions"))
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&[SessionRow::from_session(user_id, session)]),
        )
        .await?;
        Ok(())
    }

    async fn fetch_words(&self, user_id: &str, session_id: &SessionId) -> Result<Vec<WordRecord>> {
        let rows: Vec<WordRow> = self
            .send(self.client.get(self.table_url("words")).query(&[
                ("user_id", eq(user_id)),
                ("session_id", eq(&session_id.as_str())),
                ("deleted", "eq.false".to_string()),
                ("order", "created_at.asc,id.asc".to_string()),
                ("select", "*".to_string()),
            ]))
            .await?
            .json()
            .await?;
        rows.into_iter().map(WordRow::into_word).collect()
    }

    async fn replace_words(&self, user_id: &str, words: &[WordRecord]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }

        // PostgREST has no multi-statement transaction; upserting on the
        // primary key after the delete keeps a retried call at one row per id.
        self.delete_word_rows(user_id, words).await?;
        let rows: Vec<WordRow> = words
            .iter()
            .map(|word| WordRow::from_word(user_id, word))
            .collect();
        self.send(
            self.client
                .post(self.table_url("words"))
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows),
        )
        .await?;
        Ok(())
    }

    async fn soft_delete_words(&self, user_id: &str, ids: &[WordId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = ids.iter().map(WordId::as_str).collect();
        self.send(
            self.client
                .patch(self.table_url("words"))
                .query(&[("user_id", eq(user_id)), ("id", in_list(&ids))])
                .header("Prefer", "return=minimal")
                .json(&serde_json::json!({ "deleted": true })),
        )
        .await?;
        Ok(())
    }
}

impl StatsLedger for SupabaseRemote {
    async fn record_and_sync(
        &self,
        user_id: &str,
        submission: &StatsSubmission,
    ) -> Result<LedgerReceipt> {
        let offset_hours = submission
            .timezone_offset
            .unwrap_or(DEFAULT_REFERENCE_OFFSET_HOURS);
        let client_date = date_in_offset(unix_millis_now(), fixed_offset_hours(offset_hours));
        let args = RecordStatsArgs {
            p_test_date: submission.test_date,
            p_test_count: submission.test_count,
            p_correct_count: submission.correct_count,
            p_points: submission.points,
            p_timezone_offset_hours: offset_hours,
            p_client_date: client_date,
            p_expected_version: submission.expected_version,
        };

        let result = self
            .send(self.client.post(self.rpc_url(RECORD_STATS_RPC)).json(&args))
            .await;
        let response = match result {
            Ok(response) => response,
            Err(Error::Remote { message, .. }) if message.contains(FROZEN_DATE_MESSAGE) => {
                return Err(Error::FrozenDate(submission.test_date.unwrap_or(client_date)));
            }
            Err(error) => return Err(error),
        };

        let receipt = decode_receipt(&response.text().await?)?;
        if receipt.conflict_detected {
            tracing::warn!(
                "Stats version conflict on {} for user {}; remote merged additively",
                receipt.date,
                user_id
            );
        }
        Ok(receipt)
    }

    async fn daily_stats(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyStatsRecord>> {
        let rows: Vec<DailyStatsRow> = self
            .send(self.client.get(self.table_url("daily_stats")).query(&[
                ("user_id", eq(user_id)),
                ("date", eq(&date.to_string())),
                ("select", "*".to_string()),
            ]))
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().next().map(DailyStatsRow::into_record))
    }
}

#[derive(Debug, Serialize)]
struct RecordStatsArgs {
    p_test_date: Option<NaiveDate>,
    p_test_count: u32,
    p_correct_count: u32,
    p_points: i64,
    p_timezone_offset_hours: i32,
    p_client_date: NaiveDate,
    p_expected_version: Option<i64>,
}

/// The RPC is declared `RETURNS TABLE`, so PostgREST answers with a one-row
/// array; a scalar composite return arrives as a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReceiptPayload {
    Row(LedgerReceipt),
    Rows(Vec<LedgerReceipt>),
}

fn decode_receipt(body: &str) -> Result<LedgerReceipt> {
    match serde_json::from_str::<ReceiptPayload>(body)? {
        ReceiptPayload::Row(receipt) => Ok(receipt),
        ReceiptPayload::Rows(rows) => rows.into_iter().next().ok_or_else(|| Error::Remote {
            status: 200,
            message: format!("{RECORD_STATS_RPC} returned no rows"),
        }),
    }
}

/// `daily_stats` row as PostgREST returns it
#[derive(Debug, Deserialize)]
struct DailyStatsRow {
    user_id: String,
    date: NaiveDate,
    total_count: i64,
    correct_count: i64,
    total_points: i64,
    version: i64,
    #[serde(default)]
    is_frozen: bool,
    #[serde(with = "timestamp")]
    updated_at: i64,
}

impl DailyStatsRow {
    fn into_record(self) -> DailyStatsRecord {
        DailyStatsRecord {
            user_id: self.user_id,
            date: self.date,
            total_count: self.total_count,
            correct_count: self.correct_count,
            total_points: self.total_points,
            version: self.version,
            is_frozen: self.is_frozen,
            updated_at: self.updated_at,
        }
    }
}

/// Timestamp columns are `timestamptz`: written as RFC 3339, read back from
/// either RFC 3339 text or Unix milliseconds (`bigint` schemas).
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    fn to_millis(raw: Raw) -> Result<i64, String> {
        match raw {
            Raw::Millis(millis) => Ok(millis),
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|at| at.timestamp_millis())
                .map_err(|error| format!("invalid timestamp {text:?}: {error}")),
        }
    }

    pub fn serialize<S: Serializer>(millis: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        match DateTime::<Utc>::from_timestamp_millis(*millis) {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_i64(*millis),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        to_millis(Raw::deserialize(deserializer)?).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer, Serializer};

        use super::{to_millis, Raw};

        pub fn serialize<S: Serializer>(
            millis: &Option<i64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match millis {
                Some(millis) => super::serialize(millis, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<i64>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?
                .map(to_millis)
                .transpose()
                .map_err(de::Error::custom)
        }
    }
}

/// `sessions` row; `created_at` carries the session timestamp
#[derive(Debug, Serialize, Deserialize)]
struct SessionRow {
    id: String,
    user_id: String,
    word_count: u32,
    target_count: u32,
    library_tag: String,
    #[serde(default)]
    deleted: bool,
    #[serde(with = "timestamp")]
    created_at: i64,
}

impl SessionRow {
    fn from_session(user_id: &str, session: &Session) -> Self {
        Self {
            id: session.id.as_str(),
            user_id: user_id.to_string(),
            word_count: session.word_count,
            target_count: session.target_count,
            library_tag: session.library_tag.clone(),
            deleted: session.deleted,
            created_at: session.timestamp,
        }
    }

    fn into_session(self) -> Result<Session> {
        Ok(Session {
            id: parse_id(&self.id)?,
            timestamp: self.created_at,
            word_count: self.word_count,
            target_count: self.target_count,
            library_tag: self.library_tag,
            deleted: self.deleted,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WordRow {
    id: String,
    user_id: String,
    #[serde(flatten)]
    word: WordFields,
}

#[derive(Debug, Serialize, Deserialize)]
struct WordFields {
    session_id: String,
    text: String,
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    tested: bool,
    #[serde(default)]
    error_count: u32,
    best_time_ms: Option<i64>,
    #[serde(default, with = "timestamp::option")]
    last_tested: Option<i64>,
    phonetic: Option<String>,
    audio_url: Option<String>,
    #[serde(default)]
    definitions: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(with = "timestamp")]
    created_at: i64,
}

impl WordRow {
    fn from_word(user_id: &str, word: &WordRecord) -> Self {
        Self {
            id: word.id.as_str(),
            user_id: user_id.to_string(),
            word: WordFields {
                session_id: word.session_id.as_str(),
                text: word.text.clone(),
                correct: word.correct,
                tested: word.tested,
                error_count: word.error_count,
                best_time_ms: word.best_time_ms,
                last_tested: word.last_tested,
                phonetic: word.phonetic.clone(),
                audio_url: word.audio_url.clone(),
                definitions: word.definitions.clone(),
                tags: word.tags.clone(),
                deleted: word.deleted,
                created_at: word.created_at,
            },
        }
    }

    fn into_word(self) -> Result<WordRecord> {
        let fields = self.word;
        Ok(WordRecord {
            id: parse_id(&self.id)?,
            session_id: parse_id(&fields.session_id)?,
            text: fields.text,
            correct: fields.correct,
            tested: fields.tested,
            error_count: fields.error_count,
            best_time_ms: fields.best_time_ms,
            last_tested: fields.last_tested,
            phonetic: fields.phonetic,
            audio_url: fields.audio_url,
            definitions: fields.definitions,
            tags: fields.tags,
            deleted: fields.deleted,
            created_at: fields.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.details.filter(|details| !details.trim().is_empty()) {
                Some(details) => format!("{}: {} ({})", message.trim(), details.trim(), status.as_u16()),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let compact = compact_text(body);
    if compact.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact, status.as_u16())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn in_list(values: &[String]) -> String {
    format!("in.({})", values.join(","))
}

fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T> {
    raw.parse().map_err(|_| Error::Remote {
        status: 200,
        message: format!("invalid id in response: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> RemoteConfig {
        RemoteConfig {
            supabase_url: "https://project.supabase.co".to_string(),
            anon_key: "anon-secret".to_string(),
            access_token: Some("user-secret".to_string()),
        }
    }

    #[test]
    fn urls_are_built_from_rest_root() {
        let remote = SupabaseRemote::new(config()).unwrap();
        assert_eq!(
            remote.table_url("sessions"),
            "https://project.supabase.co/rest/v1/sessions"
        );
        assert_eq!(
            remote.rpc_url(RECORD_STATS_RPC),
            "https://project.supabase.co/rest/v1/rpc/record_test_and_sync_stats"
        );
    }

    #[test]
    fn debug_redacts_credentials() {
        let remote = SupabaseRemote::new(config()).unwrap();
        let debug = format!("{remote:?}");
        assert!(!debug.contains("anon-secret"));
        assert!(!debug.contains("user-secret"));
    }

    #[test]
    fn parse_api_error_prefers_message_and_details() {
        let body = r#"{"message":"Cannot modify historical stats for date","details":"2026-02-13"}"#;
        let parsed = parse_api_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(
            parsed,
            "Cannot modify historical stats for date: 2026-02-13 (400)"
        );
        assert!(parsed.contains(FROZEN_DATE_MESSAGE));
    }

    #[test]
    fn parse_api_error_falls_back_to_body() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn filters_use_postgrest_syntax() {
        assert_eq!(eq("abc"), "eq.abc");
        assert_eq!(
            in_list(&["a".to_string(), "b".to_string()]),
            "in.(a,b)"
        );
    }

    #[test]
    fn session_row_maps_created_at_to_timestamp() {
        let session = Session::new("toefl", 10);
        let row = SessionRow::from_session("user-1", &session);
        assert_eq!(row.created_at, session.timestamp);
        assert_eq!(row.into_session().unwrap(), session);
    }

    #[test]
    fn session_row_reads_timestamptz_and_millis() {
        let id = SessionId::new();
        let json = format!(
            r#"{{"id":"{id}","user_id":"user-1","word_count":2,"target_count":10,
                "library_tag":"toefl","deleted":false,
                "created_at":"2026-02-14T04:00:00.250+00:00"}}"#
        );
        let row: SessionRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row.into_session().unwrap().timestamp, 1_771_041_600_250);

        let json = json.replace(r#""2026-02-14T04:00:00.250+00:00""#, "1771041600250");
        let row: SessionRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row.created_at, 1_771_041_600_250);
    }

    #[test]
    fn session_row_writes_rfc3339() {
        let mut session = Session::new("toefl", 10);
        session.timestamp = 1_771_041_600_250;
        let json = serde_json::to_value(SessionRow::from_session("user-1", &session)).unwrap();
        assert_eq!(json["created_at"], "2026-02-14T04:00:00.250Z");
    }

    #[test]
    fn word_row_reads_postgrest_payload() {
        let session_id = SessionId::new();
        let word_id = WordId::new();
        let json = format!(
            r#"{{"id":"{word_id}","user_id":"user-1","session_id":"{session_id}",
                "text":"apple","correct":true,"tested":true,"error_count":0,
                "best_time_ms":900,"last_tested":null,"phonetic":null,"audio_url":null,
                "definitions":["a fruit"],"tags":[],"deleted":false,
                "created_at":"2026-02-14T12:00:00+08:00"}}"#
        );
        let row: WordRow = serde_json::from_str(&json).unwrap();
        let word = row.into_word().unwrap();
        assert_eq!(word.created_at, 1_771_041_600_000);
        assert_eq!(word.last_tested, None);
        assert_eq!(word.session_id, session_id);
    }

    #[test]
    fn daily_stats_row_reads_timestamptz() {
        let body = r#"{"user_id":"user-1","date":"2026-02-14","total_count":20,
            "correct_count":16,"total_points":160,"version":3,"is_frozen":false,
            "updated_at":"2026-02-14T04:00:00+00:00"}"#;
        let record = serde_json::from_str::<DailyStatsRow>(body).unwrap().into_record();
        assert_eq!(record.total_points, 160);
        assert_eq!(record.updated_at, 1_771_041_600_000);
    }

    #[test]
    fn receipt_decodes_from_table_or_object() {
        let row = r#"{"date":"2026-02-14","total_count":20,"correct_count":16,
            "total_points":160,"unique_words":12,"version":3,"conflict_detected":true}"#;
        let from_table = decode_receipt(&format!("[{row}]")).unwrap();
        let from_object = decode_receipt(row).unwrap();
        assert_eq!(from_table, from_object);
        assert_eq!(from_table.version, 3);
        assert!(from_table.conflict_detected);

        assert!(matches!(
            decode_receipt("[]"),
            Err(Error::Remote { status: 200, .. })
        ));
    }

    #[test]
    fn word_row_round_trips_through_json() {
        let mut word = WordRecord::new(SessionId::new(), "apple");
        word.definitions = vec!["a fruit".to_string()];
        word.record_attempt(true, 900, 1_000);
        let json = serde_json::to_value(WordRow::from_word("user-1", &word)).unwrap();
        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["text"], "apple");

        let row: WordRow = serde_json::from_value(json).unwrap();
        assert_eq!(row.into_word().unwrap(), word);
    }
}
