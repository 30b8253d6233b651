//! Per-identity leases.
//!
//! A mutating pass holds the lease of the identity it works on, so two
//! processes never drive the same object at once. Leases expire, which lets
//! a crashed holder's lease be taken over.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StateError, VantageError};
use crate::resource::ResourceIdentity;

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300; // 5 minutes

/// Default lease duration, renewed while a pass runs.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(LOCK_EXPIRY_SECS.unsigned_abs());

/// Information about an identity lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Leased identity.
    pub identity: ResourceIdentity,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lease for `identity` lasting [`DEFAULT_LEASE_TTL`].
    ///
    /// An empty `holder` is replaced by [`generate_holder_id`].
    #[must_use]
    pub fn new(identity: &ResourceIdentity, holder: &str) -> Self {
        Self::with_ttl(identity, holder, DEFAULT_LEASE_TTL)
    }

    /// Creates a new lease for `identity` lasting `ttl`.
    #[must_use]
    pub fn with_ttl(identity: &ResourceIdentity, holder: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        let holder = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        Self {
            lock_id: Uuid::new_v4().to_string(),
            identity: identity.clone(),
            holder,
            acquired_at: now,
            expires_at: now + lease_delta(ttl),
        }
    }

    /// Pushes the expiry `ttl` past now.
    pub fn refresh(&mut self, ttl: Duration) {
        self.expires_at = Utc::now() + lease_delta(ttl);
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

fn lease_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(LOCK_EXPIRY_SECS))
}

/// Error for a renewal whose lease was taken over or released.
pub(crate) fn lease_lost(identity: &ResourceIdentity, lock_id: &str) -> VantageError {
    StateError::LockFailed {
        message: format!("Lease {lock_id} on {identity} is no longer held"),
    }
    .into()
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = Uuid::new_v4().simple().to_string();
    let short = uuid.get(..8).unwrap_or(&uuid);

    format!("{hostname}-{pid}-{short}")
}
