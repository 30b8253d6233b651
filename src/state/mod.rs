//! Durable state of managed objects.
//!
//! Every managed object has one record keyed by its identity. Backends
//! persist records atomically and hand out per-identity leases so that two
//! reconciler processes never drive the same object at once.

mod keyed;
mod local;
mod lock;
mod memory;
mod s3;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{DEFAULT_LEASE_TTL, LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use memory::MemoryStateStore;
pub use s3::S3StateStore;
pub use store::StateStore;
pub use types::{HistoryEntry, MAX_HISTORY, Operation, STATE_VERSION, StateRecord};
