//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.
//! Records are keyed by identity; the store holds no business logic.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::resource::ResourceIdentity;

use super::lock::{DEFAULT_LEASE_TTL, LockInfo};
use super::types::StateRecord;

/// Trait for state storage backends.
///
/// `save` is atomic per identity: a concurrent `load` sees either the old or
/// the new record, never a mix. Operations on different identities never
/// interfere with each other.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the record of an identity.
    ///
    /// Returns `None` if no record exists.
    async fn load(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>>;

    /// Saves a record under its identity, replacing any previous one.
    async fn save(&self, record: &StateRecord) -> Result<()>;

    /// Deletes the record of an identity. Deleting a missing record succeeds.
    async fn delete(&self, identity: &ResourceIdentity) -> Result<()>;

    /// Lists all records.
    async fn list(&self) -> Result<Vec<StateRecord>>;

    /// Finds the record a configuration entry was applied as.
    async fn find_by_address(
        &self,
        resource_type: &str,
        address: &str,
    ) -> Result<Option<StateRecord>> {
        Ok(self.list().await?.into_iter().find(|r| {
            r.resource_type == resource_type && r.address.as_deref() == Some(address)
        }))
    }

    /// Acquires the lease of an identity.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, identity: &ResourceIdentity, holder: &str) -> Result<LockInfo>;

    /// Extends a held lease by [`StateStore::lease_ttl`].
    ///
    /// Fails if `lock_id` no longer holds the lease.
    async fn renew_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<LockInfo>;

    /// Releases a lease. Releasing with a stale lock id does nothing.
    async fn release_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<()>;

    /// Gets current lease information if leased.
    async fn get_lock_info(&self, identity: &ResourceIdentity) -> Result<Option<LockInfo>>;

    /// Removes a lease regardless of its holder.
    async fn force_unlock(&self, identity: &ResourceIdentity) -> Result<()>;

    /// How long a lease lasts without renewal.
    fn lease_ttl(&self) -> Duration {
        DEFAULT_LEASE_TTL
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
