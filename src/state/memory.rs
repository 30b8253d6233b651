//! In-memory state storage backend.
//!
//! Nothing survives the process. Used for dry runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Result, StateError};
use crate::resource::ResourceIdentity;

use super::lock::{DEFAULT_LEASE_TTL, LockInfo, lease_lost};
use super::store::StateStore;
use super::types::StateRecord;

/// In-memory state store.
#[derive(Debug)]
pub struct MemoryStateStore {
    records: RwLock<HashMap<ResourceIdentity, StateRecord>>,
    locks: RwLock<HashMap<ResourceIdentity, LockInfo>>,
    lease_ttl: Duration,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a lease lasts without renewal.
    #[must_use]
    pub const fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self {
            records: RwLock::default(),
            locks: RwLock::default(),
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn save(&self, record: &StateRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        self.records.write().await.remove(identity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn acquire_lock(&self, identity: &ResourceIdentity, holder: &str) -> Result<LockInfo> {
        let mut locks = self.locks.write().await;
        if let Some(existing) = locks.get(identity) {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    identity: identity.to_string(),
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
        }
        let lock_info = LockInfo::with_ttl(identity, holder, self.lease_ttl);
        locks.insert(identity.clone(), lock_info.clone());
        Ok(lock_info)
    }

    async fn renew_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<LockInfo> {
        let mut locks = self.locks.write().await;
        match locks.get_mut(identity) {
            Some(lock) if lock.lock_id == lock_id => {
                lock.refresh(self.lease_ttl);
                Ok(lock.clone())
            }
            _ => Err(lease_lost(identity, lock_id)),
        }
    }

    async fn release_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<()> {
        let mut locks = self.locks.write().await;
        if locks.get(identity).is_some_and(|l| l.lock_id == lock_id) {
            locks.remove(identity);
        }
        Ok(())
    }

    async fn get_lock_info(&self, identity: &ResourceIdentity) -> Result<Option<LockInfo>> {
        Ok(self.locks.read().await.get(identity).cloned())
    }

    async fn force_unlock(&self, identity: &ResourceIdentity) -> Result<()> {
        self.locks.write().await.remove(identity);
        Ok(())
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
