//! Sync engine settings and remote endpoint configuration.
//!
//! `SyncSettings` carries the tunables of the resolver, orchestrator, queue
//! and ledger. `RemoteConfig` describes the managed Supabase backend and is
//! discovered from the environment.

use std::env;
use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::util::{fixed_offset_hours, is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_ACCESS_TOKEN: &str = "LEXA_ACCESS_TOKEN";

/// Two edits closer together than this are treated as simultaneous.
pub const DEFAULT_CONCURRENCY_WINDOW_MS: i64 = 1000;
/// Words written per atomic remote batch.
pub const DEFAULT_WORD_BATCH_SIZE: usize = 100;
/// Attempts before a queued statistics delta is discarded.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Delay before retry N (1-based) of a queued delta.
pub const DEFAULT_BACKOFF_MS: [i64; 3] = [1_000, 5_000, 15_000];
/// Hours east of UTC that define "today" for the statistics ledger.
pub const DEFAULT_REFERENCE_OFFSET_HOURS: i32 = 8;

/// Tunables shared by the sync components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub concurrency_window_ms: i64,
    pub word_batch_size: usize,
    pub max_retries: u32,
    pub backoff_ms: Vec<i64>,
    pub reference_offset_hours: i32,
    /// Byte cap for the local document; unlimited when absent
    pub local_quota_bytes: Option<usize>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency_window_ms: DEFAULT_CONCURRENCY_WINDOW_MS,
            word_batch_size: DEFAULT_WORD_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS.to_vec(),
            reference_offset_hours: DEFAULT_REFERENCE_OFFSET_HOURS,
            local_quota_bytes: None,
        }
    }
}

impl SyncSettings {
    /// Load settings from a JSON file, falling back to defaults when absent.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str::<Self>(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_window_ms < 0 {
            return Err(Error::InvalidInput(
                "concurrency_window_ms must not be negative".to_string(),
            ));
        }
        if self.word_batch_size == 0 {
            return Err(Error::InvalidInput(
                "word_batch_size must be at least 1".to_string(),
            ));
        }
        if self.backoff_ms.is_empty() || self.backoff_ms.iter().any(|delay| *delay < 0) {
            return Err(Error::InvalidInput(
                "backoff_ms must hold at least one non-negative delay".to_string(),
            ));
        }
        if self.local_quota_bytes == Some(0) {
            return Err(Error::InvalidInput(
                "local_quota_bytes must be positive".to_string(),
            ));
        }
        if !(-23..=23).contains(&self.reference_offset_hours) {
            return Err(Error::InvalidInput(
                "reference_offset_hours must be within -23..=23".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait after the `retry_count`-th failure (1-based).
    ///
    /// Counts past the end of the table reuse the last entry.
    #[must_use]
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let index = usize::try_from(retry_count.saturating_sub(1)).unwrap_or(usize::MAX);
        let delay = self
            .backoff_ms
            .get(index)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(u64::try_from(delay).unwrap_or(0))
    }

    #[must_use]
    pub fn reference_offset(&self) -> FixedOffset {
        fixed_offset_hours(self.reference_offset_hours)
    }
}

/// Managed Supabase backend configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Supabase project URL
    pub supabase_url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// User access token; the anon key is used when absent
    pub access_token: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    /// Load remote configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// PostgREST base URL
    #[must_use]
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<RemoteConfig>> {
    let supabase_url = normalize_text_option(lookup(ENV_SUPABASE_URL));
    let anon_key = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY));
    let access_token = normalize_text_option(lookup(ENV_ACCESS_TOKEN));

    if supabase_url.is_none() && anon_key.is_none() && access_token.is_none() {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if supabase_url.is_none() {
        missing.push(ENV_SUPABASE_URL);
    }
    if anon_key.is_none() {
        missing.push(ENV_SUPABASE_ANON_KEY);
    }

    let (Some(supabase_url), Some(anon_key)) = (supabase_url, anon_key) else {
        return Err(Error::InvalidInput(format!(
            "Remote configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    };

    if !is_http_url(&supabase_url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_SUPABASE_URL} must include http:// or https://"
        )));
    }

    Ok(Some(RemoteConfig {
        supabase_url: supabase_url.trim_end_matches('/').to_string(),
        anon_key,
        access_token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<Option<RemoteConfig>> {
        parse_config(|key| map.get(key).map(ToString::to_string))
    }

    #[test]
    fn parse_config_none_returns_none() {
        let map = HashMap::new();
        assert!(parse_from_map(&map).unwrap().is_none());
    }

    #[test]
    fn parse_config_requires_url_and_key() {
        let mut map = HashMap::new();
        map.insert(ENV_ACCESS_TOKEN, "token");

        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => {
                assert!(message.contains(ENV_SUPABASE_URL));
                assert!(message.contains(ENV_SUPABASE_ANON_KEY));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_normalizes_url() {
        let mut map = HashMap::new();
        map.insert(ENV_SUPABASE_URL, " https://project.supabase.co/ ");
        map.insert(ENV_SUPABASE_ANON_KEY, "anon");

        let config = parse_from_map(&map).unwrap().unwrap();
        assert_eq!(config.rest_url(), "https://project.supabase.co/rest/v1");
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn remote_config_debug_redacts_keys() {
        let config = RemoteConfig {
            supabase_url: "https://project.supabase.co".to_string(),
            anon_key: "anon-secret".to_string(),
            access_token: Some("token-secret".to_string()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn backoff_follows_table() {
        let settings = SyncSettings::default();
        assert_eq!(settings.backoff_for(1), Duration::from_secs(1));
        assert_eq!(settings.backoff_for(2), Duration::from_secs(5));
        assert_eq!(settings.backoff_for(3), Duration::from_secs(15));
        assert_eq!(settings.backoff_for(7), Duration::from_secs(15));
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: SyncSettings = serde_json::from_str(r#"{"word_batch_size": 25}"#).unwrap();
        assert_eq!(settings.word_batch_size, 25);
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        settings.validate().unwrap();
    }

    #[test]
    fn settings_reject_zero_batch() {
        let settings = SyncSettings {
            word_batch_size: 0,
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
