//! Whole-document persistence backends

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Load/save/clear capability for a single serialized document.
///
/// Every `save` replaces the whole document.
#[allow(async_fn_in_trait)]
pub trait DocumentStore<D> {
    /// Load the document, `None` when nothing was saved yet
    ///
    /// Undecodable content is reported as [`Error::Corrupted`].
    async fn load(&self) -> Result<Option<D>>;

    /// Overwrite the document
    async fn save(&self, document: &D) -> Result<()>;

    /// Remove the document
    async fn clear(&self) -> Result<()>;
}

/// Byte limit applied to serialized documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreQuota {
    pub max_bytes: usize,
}

impl StoreQuota {
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    fn check(self, needed: usize) -> Result<()> {
        if needed > self.max_bytes {
            return Err(Error::QuotaExceeded {
                needed,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// JSON document stored in a single file
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore<D> {
    path: PathBuf,
    quota: Option<StoreQuota>,
    _document: PhantomData<fn() -> D>,
}

impl<D> JsonFileStore<D> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
            _document: PhantomData,
        }
    }

    #[must_use]
    pub const fn with_quota(mut self, quota: StoreQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move an undecodable document aside so the next save starts clean.
    async fn quarantine(&self) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "document".into(), |name| name.to_string_lossy());
        let backup_path = self
            .path
            .with_file_name(format!("{file_name}.corrupt-{timestamp}"));
        tokio::fs::rename(&self.path, &backup_path).await?;
        tracing::warn!(
            "Moved corrupted local document from {} to {}",
            self.path.display(),
            backup_path.display()
        );
        Ok(())
    }
}

impl<D: Serialize + DeserializeOwned> DocumentStore<D> for JsonFileStore<D> {
    async fn load(&self) -> Result<Option<D>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) if error.kind() == std::io::ErrorKind::InvalidData => {
                self.quarantine().await?;
                return Err(Error::Corrupted(error.to_string()));
            }
            Err(error) => return Err(error.into()),
        };

        match serde_json::from_str::<D>(&raw) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                self.quarantine().await?;
                Err(Error::Corrupted(error.to_string()))
            }
        }
    }

    async fn save(&self, document: &D) -> Result<()> {
        let serialized = serde_json::to_vec(document)?;
        if let Some(quota) = self.quota {
            quota.check(serialized.len())?;
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &serialized).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        tracing::debug!(
            "Saved {} bytes to {}",
            serialized.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// In-process document store, mainly for tests
///
/// Clones share the same slot. The document is kept serialized so quota and
/// corruption behave like the file-backed store.
#[derive(Debug, Clone)]
pub struct MemoryStore<D> {
    raw: Arc<Mutex<Option<String>>>,
    quota: Option<StoreQuota>,
    _document: PhantomData<fn() -> D>,
}

impl<D> Default for MemoryStore<D> {
    fn default() -> Self {
        Self {
            raw: Arc::new(Mutex::new(None)),
            quota: None,
            _document: PhantomData,
        }
    }
}

impl<D> MemoryStore<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_quota(mut self, quota: StoreQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Replace the stored bytes verbatim
    pub async fn set_raw(&self, raw: impl Into<String>) {
        *self.raw.lock().await = Some(raw.into());
    }

    /// Stored bytes, if any
    pub async fn raw(&self) -> Option<String> {
        self.raw.lock().await.clone()
    }
}

impl<D: Serialize + DeserializeOwned> DocumentStore<D> for MemoryStore<D> {
    async fn load(&self) -> Result<Option<D>> {
        let mut slot = self.raw.lock().await;
        let Some(raw) = slot.as_deref() else {
            return Ok(None);
        };
        match serde_json::from_str::<D>(raw) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                *slot = None;
                Err(Error::Corrupted(error.to_string()))
            }
        }
    }

    async fn save(&self, document: &D) -> Result<()> {
        let serialized = serde_json::to_string(document)?;
        if let Some(quota) = self.quota {
            quota.check(serialized.len())?;
        }
        *self.raw.lock().await = Some(serialized);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.raw.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Backup;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_round_trips_and_clears() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Backup>::new(dir.path().join("nested").join("backup.json"));

        assert!(store.load().await.unwrap().is_none());
        store.save(&Backup::default()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(Backup::default()));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_quarantines_corrupted_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::<Backup>::new(&path);

        let error = store.load().await.unwrap_err();
        assert!(matches!(error, Error::Corrupted(_)));
        assert!(!path.exists());

        let quarantined = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(quarantined);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_enforces_quota() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Backup>::new(dir.path().join("backup.json"))
            .with_quota(StoreQuota::new(4));

        let error = store.save(&Backup::default()).await.unwrap_err();
        assert!(matches!(error, Error::QuotaExceeded { limit: 4, .. }));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn memory_store_clones_share_state() {
        let store = MemoryStore::<Backup>::new();
        let other = store.clone();
        store.save(&Backup::default()).await.unwrap();
        assert!(other.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_store_reports_and_drops_corruption() {
        let store = MemoryStore::<Backup>::new();
        store.set_raw("[1, 2").await;
        assert!(matches!(
            store.load().await.unwrap_err(),
            Error::Corrupted(_)
        ));
        assert!(store.raw().await.is_none());
    }
}
