//! Runs over a whole configuration file.
//!
//! A [`Session`] binds a parsed configuration to a state store and an
//! executor, and drives one [`Reconciler`] per resource type. Resources are
//! independent of each other: a failing resource is reported and the run
//! moves on to the next one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{ResourceConfig, StateBackend, StateConfig, VantageConfig};
use crate::error::{ConfigError, LifecycleError, Result, VantageError};
use crate::executor::{CancelSignal, QueryServiceExecutor, RemoteExecutor};
use crate::planner::{ActionType, Plan, ResourcePlan};
use crate::reconciler::{ReadResult, Reconciler};
use crate::resource::{self, ReconciliationState, ResourceIdentity};
use crate::state::{
    LocalStateStore, MemoryStateStore, S3StateStore, STATE_DIR, StateRecord, StateStore,
    generate_holder_id,
};

/// A configuration bound to its state store and remote system.
pub struct Session {
    config: VantageConfig,
    store: Arc<dyn StateStore>,
    executor: Arc<dyn RemoteExecutor>,
    command_timeout: Duration,
    holder: String,
}

/// Outcome of an apply or destroy run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ApplyReport {
    /// Whether every planned action converged.
    pub success: bool,
    /// Number of objects created.
    pub created: usize,
    /// Number of objects altered in place.
    pub updated: usize,
    /// Number of objects dropped and created again.
    pub replaced: usize,
    /// Number of objects deleted.
    pub deleted: usize,
    /// Number of objects already converged.
    pub unchanged: usize,
    /// Resources whose record needs a repair pass after this run.
    pub tainted: Vec<String>,
    /// Errors encountered, one per resource.
    pub errors: Vec<String>,
}

/// Outcome of a refresh run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RefreshReport {
    /// One entry per record that was read back.
    pub entries: Vec<RefreshEntry>,
    /// Errors encountered, one per record.
    pub errors: Vec<String>,
}

/// Result of reading back one record.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshEntry {
    /// Operator-facing name (the identity when the record has none).
    pub address: String,
    /// Identity of the object.
    pub identity: ResourceIdentity,
    /// State before the read.
    pub before: ReconciliationState,
    /// State after the read.
    pub after: ReconciliationState,
    /// Whether the remote object differs from what was stored.
    pub drifted: bool,
}

enum Applied {
    Created,
    Updated,
    Replaced,
    Deleted,
    Unchanged,
}

impl Session {
    /// Creates a session from already-built parts.
    #[must_use]
    pub fn new(
        config: VantageConfig,
        store: Arc<dyn StateStore>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        let command_timeout = Duration::from_secs(config.connection.command_timeout_secs);
        Self {
            config,
            store,
            executor,
            command_timeout,
            holder: generate_holder_id(),
        }
    }

    /// Opens the configured state store and connects to the Query Service.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the HTTP client
    /// cannot be created.
    pub async fn connect(config: VantageConfig, base_dir: &Path, password: &str) -> Result<Self> {
        let store = open_store(&config.state, base_dir).await?;
        let connection = &config.connection;
        let executor = QueryServiceExecutor::with_timeout(
            &connection.base_url,
            &connection.system,
            &connection.user,
            password,
            Duration::from_secs(connection.timeout_secs),
        )?;
        Ok(Self::new(config, store, Arc::new(executor)))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &VantageConfig {
        &self.config
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    /// Builds the reconciler for one resource type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedResourceType`] for unknown types.
    pub fn reconciler(&self, resource_type: &str) -> Result<Reconciler> {
        let definition =
            resource::definition(resource_type).ok_or_else(|| ConfigError::UnsupportedResourceType {
                resource_type: resource_type.to_string(),
            })?;
        Ok(Reconciler::new(
            definition.schema,
            definition.dialect,
            Arc::clone(&self.executor),
            Arc::clone(&self.store),
        )
        .with_command_timeout(self.command_timeout)
        .with_holder(self.holder.clone()))
    }

    // ------------------------------------------------------------------
    // Plans
    // ------------------------------------------------------------------

    /// Computes what `apply` would do, without executing anything.
    ///
    /// Configured resources come first, in file order; stored records no
    /// longer in the configuration are planned for deletion last.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or a resource violates
    /// its schema.
    pub async fn plan(&self) -> Result<Plan> {
        let records = self.store.list().await?;
        let mut entries = Vec::with_capacity(self.config.resources.len());

        for resource in &self.config.resources {
            let record = records.iter().find(|r| claims(r, resource));
            let entry = self
                .reconciler(&resource.resource_type)?
                .plan_apply(&resource.name, &resource.attributes, record)?;
            entries.push(entry);
        }

        for record in records.iter().filter(|r| !self.is_configured(r)) {
            entries.push(self.reconciler(&record.resource_type)?.plan_delete(record)?);
        }

        Ok(Plan::new(entries))
    }

    /// Computes the deletion of every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or a record cannot be
    /// addressed.
    pub async fn plan_destroy(&self) -> Result<Plan> {
        let mut entries = Vec::new();
        for record in self.store.list().await? {
            entries.push(self.reconciler(&record.resource_type)?.plan_delete(&record)?);
        }
        Ok(Plan::new(entries))
    }

    fn is_configured(&self, record: &StateRecord) -> bool {
        self.config.resources.iter().any(|c| claims(record, c))
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Runs every entry of `plan`, one resource at a time.
    ///
    /// Each entry is re-diffed against the store when it runs, so a stale
    /// plan never sends stale commands. Entries that need repair are
    /// skipped and reported. Once `cancel` fires, remaining entries are
    /// skipped.
    pub async fn apply(&self, plan: &Plan, cancel: &CancelSignal) -> ApplyReport {
        let mut report = ApplyReport::default();
        info!("Applying {} plan entries", plan.resources.len());

        for entry in &plan.resources {
            if cancel.is_cancelled() && entry.action != ActionType::NoOp {
                report.errors.push(format!("{}: skipped, run cancelled", entry.address));
                continue;
            }

            match self.apply_entry(entry, cancel).await {
                Ok(Applied::Created) => report.created += 1,
                Ok(Applied::Updated) => report.updated += 1,
                Ok(Applied::Replaced) => report.replaced += 1,
                Ok(Applied::Deleted) => report.deleted += 1,
                Ok(Applied::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    error!("{} failed: {e}", entry.address);
                    if e.is_ambiguous() || self.needs_repair(entry).await {
                        report.tainted.push(entry.address.clone());
                    }
                    report.errors.push(format!("{}: {e}", entry.address));
                }
            }
        }

        report.success = report.errors.is_empty();
        report
    }

    async fn apply_entry(&self, entry: &ResourcePlan, cancel: &CancelSignal) -> Result<Applied> {
        let reconciler = self.reconciler(&entry.resource_type)?;

        match (entry.action, entry.identity.as_ref()) {
            (ActionType::NoOp, _) => Ok(Applied::Unchanged),
            (ActionType::Create, _) => {
                let desired = self.desired(&entry.address)?;
                reconciler
                    .create_addressed(Some(&entry.address), &desired.attributes, cancel)
                    .await?;
                Ok(Applied::Created)
            }
            (ActionType::Update | ActionType::Replace, Some(identity)) => {
                let desired = self.desired(&entry.address)?;
                let updated = reconciler.update(identity, &desired.attributes, cancel).await?;
                Ok(if updated.replaced {
                    Applied::Replaced
                } else {
                    Applied::Updated
                })
            }
            (ActionType::Delete, Some(identity)) => {
                reconciler.delete(identity, cancel).await?;
                Ok(Applied::Deleted)
            }
            (ActionType::Repair, Some(identity)) => {
                warn!("{} needs repair; skipping", entry.address);
                Err(LifecycleError::NeedsRepair {
                    identity: identity.to_string(),
                    state: ReconciliationState::Tainted.to_string(),
                }
                .into())
            }
            (action, None) => Err(VantageError::internal(format!(
                "{action} entry for '{}' has no identity",
                entry.address
            ))),
        }
    }

    /// Returns true if the entry's stored record was left needing repair.
    async fn needs_repair(&self, entry: &ResourcePlan) -> bool {
        let Some(identity) = &entry.identity else {
            return false;
        };
        match self.store.load(identity).await {
            Ok(record) => record.is_some_and(|r| r.state.needs_repair()),
            Err(e) => {
                warn!("Could not reload {}: {e}", entry.address);
                false
            }
        }
    }

    fn desired(&self, address: &str) -> Result<&ResourceConfig> {
        self.config
            .resource(address)
            .ok_or_else(|| VantageError::internal(format!("'{address}' is not in the configuration")))
    }

    /// Reads back every stored record, repairing tainted ones on the way.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed. Failed reads are
    /// reported per record.
    pub async fn refresh(&self, cancel: &CancelSignal) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        for record in self.store.list().await? {
            let address = display_address(&record);
            let result = match self.reconciler(&record.resource_type) {
                Ok(reconciler) => reconciler.read(&record.identity, cancel).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(read) => report.entries.push(RefreshEntry {
                    drifted: !read.present || read.attributes != record.attributes,
                    address,
                    identity: record.identity,
                    before: record.state,
                    after: read.state,
                }),
                Err(e) => {
                    error!("Refresh of {address} failed: {e}");
                    report.errors.push(format!("{address}: {e}"));
                }
            }
        }

        Ok(report)
    }

    /// Repairs one record, found by address or identity.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownIdentity`] if no record matches, or
    /// the read pass error.
    pub async fn repair(&self, key: &str, cancel: &CancelSignal) -> Result<ReadResult> {
        let record = find_record(self.store.as_ref(), key)
            .await?
            .ok_or_else(|| LifecycleError::UnknownIdentity {
                identity: key.to_string(),
            })?;
        self.reconciler(&record.resource_type)?
            .repair(&record.identity, cancel)
            .await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("system", &self.config.connection.system)
            .field("store", &self.store.backend_type())
            .field("executor", &self.executor.name())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RefreshReport {
    /// Returns the entries whose remote object changed or disappeared.
    pub fn drifted(&self) -> impl Iterator<Item = &RefreshEntry> {
        self.entries.iter().filter(|e| e.drifted)
    }

    /// Returns true if nothing drifted and every read succeeded.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.errors.is_empty() && self.drifted().next().is_none()
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} replaced, {} deleted, {} unchanged",
            self.created, self.updated, self.replaced, self.deleted, self.unchanged
        )?;
        if !self.errors.is_empty() {
            write!(f, ", {} failed", self.errors.len())?;
        }
        Ok(())
    }
}

/// Opens the state store a configuration asks for.
///
/// The local backend defaults to `<base_dir>/.vantage`.
///
/// # Errors
///
/// Returns an error if the S3 backend has no bucket or its client cannot be
/// initialized.
pub async fn open_store(state: &StateConfig, base_dir: &Path) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match state.backend {
        StateBackend::Local => {
            let dir = state
                .path
                .as_ref()
                .map_or_else(|| base_dir.join(STATE_DIR), |p| base_dir.join(p));
            Arc::new(LocalStateStore::with_base_dir(dir))
        }
        StateBackend::S3 => {
            let bucket = state.bucket.as_deref().ok_or_else(|| {
                ConfigError::validation("S3 bucket name is required when using S3 backend", "state.bucket")
            })?;
            Arc::new(S3StateStore::new(bucket, state.prefix.as_deref(), state.region.as_deref()).await?)
        }
        StateBackend::Memory => Arc::new(MemoryStateStore::new()),
    };
    info!("Using {} state backend", store.backend_type());
    Ok(store)
}

/// Finds a record by address, falling back to its identity.
///
/// # Errors
///
/// Returns an error if the store cannot be listed.
pub async fn find_record(store: &dyn StateStore, key: &str) -> Result<Option<StateRecord>> {
    let records = store.list().await?;
    let by_address = records.iter().position(|r| r.address.as_deref() == Some(key));
    let index = by_address.or_else(|| records.iter().position(|r| r.identity.as_str() == key));
    Ok(index.and_then(|i| records.into_iter().nth(i)))
}

fn claims(record: &StateRecord, resource: &ResourceConfig) -> bool {
    record.resource_type == resource.resource_type && record.address.as_deref() == Some(&resource.name)
}

fn display_address(record: &StateRecord) -> String {
    record
        .address
        .clone()
        .unwrap_or_else(|| record.identity.to_string())
}
