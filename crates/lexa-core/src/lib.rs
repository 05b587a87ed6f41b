//! lexa-core - Offline-first sync engine for Lexa
//!
//! This crate holds the session/word models, the local document store, the
//! conflict resolver, the sync orchestrator, the pending statistics queue and
//! the remote store clients used by every Lexa interface.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use clock::Clock;
pub use config::{RemoteConfig, SyncSettings};
pub use error::{Error, Result};
pub use models::{Session, SessionId, SessionWithSync, SyncStatus, WordId, WordRecord};
pub use sync::{PendingSyncQueue, SyncDecision, SyncOrchestrator};
