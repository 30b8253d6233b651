//! Local file-based state storage backend.
//!
//! Each identity gets one JSON file under `resources/` and, while leased,
//! one lock file under `locks/`. Suitable for a single operator machine.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StateError, VantageError};
use crate::resource::ResourceIdentity;

use super::keyed::KeyedMutex;
use super::lock::{DEFAULT_LEASE_TTL, LockInfo, lease_lost};
use super::store::StateStore;
use super::types::StateRecord;

/// Default state directory name.
pub const STATE_DIR: &str = ".vantage";

/// Directory holding one record per identity.
const RECORDS_DIR: &str = "resources";

/// Directory holding one lock file per leased identity.
const LOCKS_DIR: &str = "locks";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Per-identity serialization.
    keys: KeyedMutex,
    /// How long a lease lasts without renewal.
    lease_ttl: Duration,
}

impl LocalStateStore {
    /// Creates a new local state store in `./.vantage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| VantageError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a new local state store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            keys: KeyedMutex::new(),
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Sets how long a lease lasts without renewal.
    #[must_use]
    pub const fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn checked(identity: &ResourceIdentity) -> Result<&str> {
        if identity.is_well_formed() {
            Ok(identity.as_str())
        } else {
            Err(StateError::InvalidKey {
                key: identity.to_string(),
            }
            .into())
        }
    }

    fn record_path(&self, identity: &ResourceIdentity) -> Result<PathBuf> {
        let key = Self::checked(identity)?;
        Ok(self.base_dir.join(RECORDS_DIR).join(format!("{key}.json")))
    }

    fn lock_path(&self, identity: &ResourceIdentity) -> Result<PathBuf> {
        let key = Self::checked(identity)?;
        Ok(self.base_dir.join(LOCKS_DIR).join(format!("{key}.lock")))
    }

    /// Ensures a directory exists.
    async fn ensure_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await.map_err(|e| {
            StateError::unavailable(format!("Failed to create state directory {}: {e}", dir.display())).into()
        })
    }

    /// Reads and parses a JSON file, treating a missing file as `None`.
    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::unavailable(format!("Failed to read {}: {e}", path.display())).into());
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to parse {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Writes to a temporary file first, then renames it over `path`.
    async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent).await?;
        }

        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            StateError::unavailable(format!("Failed to create temp state file: {e}"))
        })?;

        file.write_all(content).await.map_err(|e| {
            StateError::unavailable(format!("Failed to write state file: {e}"))
        })?;

        file.sync_all().await.map_err(|e| {
            StateError::unavailable(format!("Failed to sync state file: {e}"))
        })?;

        // Atomic rename
        fs::rename(&temp_path, path).await.map_err(|e| {
            StateError::unavailable(format!("Failed to rename state file: {e}"))
        })?;

        Ok(())
    }

    /// Removes a file, treating a missing file as success.
    async fn remove_file(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::unavailable(format!("Failed to delete {}: {e}", path.display())).into()),
        }
    }

    /// Creates the lock file only if none exists.
    async fn create_lock_file(path: &Path, lock_info: &LockInfo) -> Result<bool> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent).await?;
        }

        let content = serde_json::to_vec_pretty(lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(StateError::LockFailed {
                    message: format!("Failed to create lock file: {e}"),
                }
                .into());
            }
        };

        file.write_all(&content).await.map_err(|e| StateError::LockFailed {
            message: format!("Failed to write lock file: {e}"),
        })?;

        file.sync_all().await.map_err(|e| StateError::LockFailed {
            message: format!("Failed to sync lock file: {e}"),
        })?;

        Ok(true)
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>> {
        let path = self.record_path(identity)?;
        let _guard = self.keys.lock(identity.as_str()).await;

        let record: Option<StateRecord> = Self::read_json(&path).await?;
        match &record {
            Some(r) => {
                r.check_version()?;
                debug!("Loaded state record: {}", path.display());
            }
            None => debug!("State record does not exist: {}", path.display()),
        }
        Ok(record)
    }

    async fn save(&self, record: &StateRecord) -> Result<()> {
        let path = self.record_path(&record.identity)?;
        let _guard = self.keys.lock(record.identity.as_str()).await;

        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        Self::write_atomic(&path, &content).await?;
        debug!("Saved state record {} ({})", record.identity, record.state);
        Ok(())
    }

    async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        let path = self.record_path(identity)?;
        let _guard = self.keys.lock(identity.as_str()).await;

        Self::remove_file(&path).await?;
        info!("Deleted state record: {}", path.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        let dir = self.base_dir.join(RECORDS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StateError::unavailable(format!("Failed to list {}: {e}", dir.display())).into());
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::unavailable(format!("Failed to list {}: {e}", dir.display())))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(record) = Self::read_json::<StateRecord>(&path).await? {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn acquire_lock(&self, identity: &ResourceIdentity, holder: &str) -> Result<LockInfo> {
        let path = self.lock_path(identity)?;
        let lock_info = LockInfo::with_ttl(identity, holder, self.lease_ttl);

        if Self::create_lock_file(&path, &lock_info).await? {
            debug!("Acquired lock {} on {identity} (expires in {:?})", lock_info.lock_id, self.lease_ttl);
            return Ok(lock_info);
        }

        // Check for existing lock
        if let Some(existing) = Self::read_json::<LockInfo>(&path).await? {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    identity: identity.to_string(),
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            // Lock is expired, we can take it
            debug!("Expired lock found on {identity}, taking over");
            Self::remove_file(&path).await?;
        }

        if Self::create_lock_file(&path, &lock_info).await? {
            debug!("Acquired lock {} on {identity}", lock_info.lock_id);
            Ok(lock_info)
        } else {
            Err(StateError::LockFailed {
                message: format!("Lost the race for the lock on {identity}"),
            }
            .into())
        }
    }

    async fn renew_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<LockInfo> {
        let path = self.lock_path(identity)?;
        match Self::read_json::<LockInfo>(&path).await? {
            Some(mut lock) if lock.lock_id == lock_id => {
                lock.refresh(self.lease_ttl);
                let content = serde_json::to_vec_pretty(&lock)
                    .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
                Self::write_atomic(&path, &content).await?;
                debug!("Renewed lock {lock_id} on {identity}");
                Ok(lock)
            }
            _ => Err(lease_lost(identity, lock_id)),
        }
    }

    async fn release_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<()> {
        let path = self.lock_path(identity)?;
        if let Some(existing) = Self::read_json::<LockInfo>(&path).await? {
            if existing.lock_id == lock_id {
                Self::remove_file(&path).await?;
                debug!("Released lock {lock_id} on {identity}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self, identity: &ResourceIdentity) -> Result<Option<LockInfo>> {
        Self::read_json(&self.lock_path(identity)?).await
    }

    async fn force_unlock(&self, identity: &ResourceIdentity) -> Result<()> {
        Self::remove_file(&self.lock_path(identity)?).await?;
        info!("Force-unlocked {identity}");
        Ok(())
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AttributeSet, ReconciliationState};
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path());
        (store, temp_dir)
    }

    fn record(address: &str) -> StateRecord {
        StateRecord::new(
            ResourceIdentity::generate(),
            "compute_profile",
            Some(address.to_string()),
            ReconciliationState::Present,
            AttributeSet::new().with("compute_profile_name", address).with("timeout", 30),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let rec = record("analytics");
        store.save(&rec).await.expect("Failed to save state");

        let loaded = store
            .load(&rec.identity)
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded, rec);
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load(&ResourceIdentity::generate()).await.expect("Load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp) = create_test_store();
        let rec = record("analytics");
        store.save(&rec).await.expect("save");

        store.delete(&rec.identity).await.expect("delete");
        store.delete(&rec.identity).await.expect("second delete");
        assert!(store.load(&rec.identity).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_list_and_find_by_address() {
        let (store, _temp) = create_test_store();
        let a = record("a");
        let b = record("b");
        store.save(&a).await.expect("save a");
        store.save(&b).await.expect("save b");

        assert_eq!(store.list().await.expect("list").len(), 2);
        let found = store
            .find_by_address("compute_profile", "b")
            .await
            .expect("find")
            .expect("b exists");
        assert_eq!(found.identity, b.identity);
        assert!(store.find_by_address("compute_profile", "c").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn test_corrupted_record() {
        let (store, temp) = create_test_store();
        let id = ResourceIdentity::generate();
        let dir = temp.path().join(RECORDS_DIR);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(format!("{id}.json")), "{not json").expect("write");

        let err = store.load(&id).await.expect_err("corrupted");
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_rejects_path_like_identity() {
        let (store, _temp) = create_test_store();
        let err = store
            .load(&ResourceIdentity::from("../outside"))
            .await
            .expect_err("invalid key");
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();
        let id = ResourceIdentity::generate();

        let lock = store
            .acquire_lock(&id, "test-holder")
            .await
            .expect("Failed to acquire lock");

        assert!(store.get_lock_info(&id).await.expect("lock info").is_some());

        store
            .release_lock(&id, &lock.lock_id)
            .await
            .expect("Failed to release lock");

        assert!(store.get_lock_info(&id).await.expect("lock info").is_none());
    }

    #[tokio::test]
    async fn test_renew_extends_lease_on_disk() {
        let (store, _temp) = create_test_store();
        let store = store.with_lease_ttl(Duration::from_secs(1));
        let id = ResourceIdentity::generate();

        let lock = store.acquire_lock(&id, "test-holder").await.expect("acquire");
        let renewed = store.renew_lock(&id, &lock.lock_id).await.expect("renew");
        assert!(renewed.expires_at >= lock.expires_at);

        let on_disk = store.get_lock_info(&id).await.expect("lock info").expect("held");
        assert_eq!(on_disk.expires_at, renewed.expires_at);
        assert!(store.renew_lock(&id, "someone-else").await.is_err());
    }

    #[tokio::test]
    async fn test_lock_conflict_is_per_identity() {
        let (store, _temp) = create_test_store();
        let id = ResourceIdentity::generate();

        let _lock1 = store
            .acquire_lock(&id, "holder-1")
            .await
            .expect("Failed to acquire first lock");

        assert!(store.acquire_lock(&id, "holder-2").await.is_err());
        assert!(store.acquire_lock(&ResourceIdentity::generate(), "holder-2").await.is_ok());

        store.force_unlock(&id).await.expect("force unlock");
        assert!(store.acquire_lock(&id, "holder-2").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_saves_to_different_identities() {
        let (store, _temp) = create_test_store();
        let store = std::sync::Arc::new(store);
        let records: Vec<_> = (0..8).map(|i| record(&format!("r{i}"))).collect();

        let handles: Vec<_> = records
            .iter()
            .cloned()
            .map(|rec| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.save(&rec).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("save");
        }

        for rec in &records {
            assert_eq!(store.load(&rec.identity).await.expect("load").as_ref(), Some(rec));
        }
    }
}
