//! Local persistence for Lexa

mod document;
mod local;

pub use document::{DocumentStore, JsonFileStore, MemoryStore, StoreQuota};
pub use local::LocalStore;
