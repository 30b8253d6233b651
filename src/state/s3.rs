//! S3-based state storage backend.
//!
//! This module provides a remote state storage using AWS S3 (or compatible services)
//! so that several operators can share the records of one system.
//!
//! Layout under the configured prefix:
//! - `resources/<identity>.json` holds one record
//! - `locks/<identity>.lock` holds one lease

use async_trait::async_trait;
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, StateError};
use crate::resource::ResourceIdentity;

use super::keyed::KeyedMutex;
use super::lock::{DEFAULT_LEASE_TTL, LockInfo, lease_lost};
use super::store::StateStore;
use super::types::StateRecord;

/// Key prefix for records.
const RECORDS_PREFIX: &str = "resources/";

/// Key prefix for leases.
const LOCKS_PREFIX: &str = "locks/";

/// S3-based state store.
#[derive(Debug)]
pub struct S3StateStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix.
    prefix: String,
    /// Per-identity serialization within this process.
    keys: KeyedMutex,
    /// How long a lease lasts without renewal.
    lease_ttl: Duration,
}

impl S3StateStore {
    /// Creates a new S3 state store.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Ok(Self::with_client(Client::new(&config), bucket, prefix))
    }

    /// Creates a new S3 state store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
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

    fn record_key(&self, identity: &ResourceIdentity) -> Result<String> {
        Ok(format!("{}{RECORDS_PREFIX}{}.json", self.prefix, checked(identity)?))
    }

    fn lock_key(&self, identity: &ResourceIdentity) -> Result<String> {
        Ok(format!("{}{LOCKS_PREFIX}{}.lock", self.prefix, checked(identity)?))
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    StateError::s3(format!("Failed to read S3 object: {e}"))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    }
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StateError::s3(format!("S3 get error: {service_err}")).into())
                }
            }
        }
    }

    /// Gets and parses a JSON object.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(content) = self.get_object(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&content).map(Some).map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to parse s3://{}/{key}: {e}", self.bucket),
            }
            .into()
        })
    }

    /// Puts an object to S3. With `only_if_absent`, fails the write if the
    /// key already exists and returns `false`.
    async fn put_object(&self, key: &str, content: Vec<u8>, only_if_absent: bool) -> Result<bool> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.into())
            .content_type("application/json");
        if only_if_absent {
            request = request.if_none_match("*");
        }

        match request.send().await {
            Ok(_) => Ok(true),
            Err(e) if only_if_absent && e.raw_response().is_some_and(|r| r.status().as_u16() == 412) => {
                Ok(false)
            }
            Err(e) => Err(StateError::s3(format!("S3 put error: {e}")).into()),
        }
    }

    /// Deletes an object from S3. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StateError::s3(format!("S3 delete error: {e}")))?;

        Ok(())
    }

    /// Lists keys under a prefix.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| StateError::s3(format!("S3 list error: {e}")))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(String::from),
            );

            match response.next_continuation_token() {
                Some(next) if response.is_truncated() == Some(true) => token = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    fn lock_payload(lock_info: &LockInfo) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")).into())
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| {
            let p = p.trim_matches('/');
            if p.is_empty() {
                String::new()
            } else {
                format!("{p}/")
            }
        })
        .unwrap_or_default()
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

#[async_trait]
impl StateStore for S3StateStore {
    async fn load(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>> {
        let key = self.record_key(identity)?;
        let _guard = self.keys.lock(identity.as_str()).await;
        debug!("Loading state from s3://{}/{key}", self.bucket);

        let record: Option<StateRecord> = self.get_json(&key).await?;
        if let Some(r) = &record {
            r.check_version()?;
        }
        Ok(record)
    }

    async fn save(&self, record: &StateRecord) -> Result<()> {
        let key = self.record_key(&record.identity)?;
        let _guard = self.keys.lock(record.identity.as_str()).await;
        debug!("Saving state to s3://{}/{key}", self.bucket);

        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        // A single PUT replaces the object atomically.
        self.put_object(&key, content, false).await?;
        Ok(())
    }

    async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        let key = self.record_key(identity)?;
        let _guard = self.keys.lock(identity.as_str()).await;

        info!("Deleting state from s3://{}/{key}", self.bucket);
        self.delete_object(&key).await
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        let prefix = format!("{}{RECORDS_PREFIX}", self.prefix);
        let mut records = Vec::new();

        for key in self.list_keys(&prefix).await? {
            if !key.ends_with(".json") {
                continue;
            }
            if let Some(record) = self.get_json::<StateRecord>(&key).await? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn acquire_lock(&self, identity: &ResourceIdentity, holder: &str) -> Result<LockInfo> {
        let key = self.lock_key(identity)?;
        let lock_info = LockInfo::with_ttl(identity, holder, self.lease_ttl);

        if self.put_object(&key, Self::lock_payload(&lock_info)?, true).await? {
            debug!("Acquired lock {} on {identity} (expires in {:?})", lock_info.lock_id, self.lease_ttl);
            return Ok(lock_info);
        }

        // Check for existing lock
        if let Some(existing) = self.get_json::<LockInfo>(&key).await? {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    identity: identity.to_string(),
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            debug!("Expired lock found on {identity}, taking over");
            self.delete_object(&key).await?;
        }

        if self.put_object(&key, Self::lock_payload(&lock_info)?, true).await? {
            Ok(lock_info)
        } else {
            Err(StateError::LockFailed {
                message: format!("Lost the race for the lock on {identity}"),
            }
            .into())
        }
    }

    async fn renew_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<LockInfo> {
        let key = self.lock_key(identity)?;
        match self.get_json::<LockInfo>(&key).await? {
            Some(mut lock) if lock.lock_id == lock_id => {
                lock.refresh(self.lease_ttl);
                self.put_object(&key, Self::lock_payload(&lock)?, false).await?;
                debug!("Renewed lock {lock_id} on {identity}");
                Ok(lock)
            }
            _ => Err(lease_lost(identity, lock_id)),
        }
    }

    async fn release_lock(&self, identity: &ResourceIdentity, lock_id: &str) -> Result<()> {
        let key = self.lock_key(identity)?;

        if let Some(existing) = self.get_json::<LockInfo>(&key).await? {
            if existing.lock_id == lock_id {
                self.delete_object(&key).await?;
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
        self.get_json(&self.lock_key(identity)?).await
    }

    async fn force_unlock(&self, identity: &ResourceIdentity) -> Result<()> {
        self.delete_object(&self.lock_key(identity)?).await?;
        info!("Force-unlocked {identity}");
        Ok(())
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some("/")), "");
        assert_eq!(normalize_prefix(Some("/team/prod/")), "team/prod/");
    }

    #[test]
    fn test_keys_reject_malformed_identities() {
        assert!(checked(&ResourceIdentity::from("a/b")).is_err());
        assert_eq!(checked(&ResourceIdentity::from("abc-1")).ok(), Some("abc-1"));
    }
}
