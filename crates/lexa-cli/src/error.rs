use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lexa_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Session ID cannot be empty")]
    EmptySessionId,
    #[error("Session not found for id/prefix: {0}")]
    SessionNotFound(String),
    #[error("{0}")]
    AmbiguousSessionId(String),
    #[error("No words provided")]
    EmptyWords,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No user configured. Pass --user or set LEXA_USER_ID.")]
    MissingUser,
    #[error(
        "Remote store is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY, or pass --remote-db PATH."
    )]
    RemoteNotConfigured,
}
