//! Lifecycle engine for managed objects.
//!
//! Each public call is one self-contained pass over one identity:
//! diff, build, write-ahead record, execute, record outcome. Passes on
//! different identities may run concurrently; a pass holds the store lease
//! of the identity it works on.
//!
//! The state machine:
//!
//! ```text
//! absent --create--> creating --ok--> present
//!                        |--failure--> absent
//!                        '--ambiguous--> tainted
//! present --update--> updating --ok--> present
//!                        '--failure/ambiguous--> tainted
//! present|tainted --delete--> deleting --ok/absent--> absent
//!                        '--failure/ambiguous--> tainted
//! tainted --read--> present | absent | tainted
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, LifecycleError, Result, VantageError};
use crate::executor::{CancelSignal, ExecOutcome, RemoteExecutor};
use crate::planner::{
    Command, CommandBuilder, Diff, DiffEngine, ExecutionMode, LifecycleAction, ResourcePlan,
    StatementDialect,
};
use crate::resource::{
    AttributeSet, AttributeSpec, ReconciliationState, ResourceIdentity, ResourceSchema,
    validate_transition,
};
use crate::state::{Operation, StateRecord, StateStore, generate_holder_id};

/// Default upper bound for a single executor call.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(240);

/// Drives managed objects of one resource type through their lifecycle.
pub struct Reconciler {
    schema: Arc<ResourceSchema>,
    builder: CommandBuilder,
    diff_engine: DiffEngine,
    executor: Arc<dyn RemoteExecutor>,
    store: Arc<dyn StateStore>,
    command_timeout: Duration,
    holder: String,
}

/// Result of a create pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Identity minted for the new object.
    pub identity: ResourceIdentity,
    /// Stored attributes, computed ones included.
    pub attributes: AttributeSet,
}

/// Result of a read pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// Current attributes (empty when absent).
    pub attributes: AttributeSet,
    /// Whether the object exists.
    pub present: bool,
    /// Reconciliation state after the pass.
    pub state: ReconciliationState,
}

/// Result of an update pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updated {
    /// Identity of the object; a fresh one after a replacement.
    pub identity: ResourceIdentity,
    /// Stored attributes after the pass.
    pub attributes: AttributeSet,
    /// Whether the object was dropped and created again.
    pub replaced: bool,
}

impl ReadResult {
    const fn absent() -> Self {
        Self {
            attributes: AttributeSet::new(),
            present: false,
            state: ReconciliationState::Absent,
        }
    }
}

impl Reconciler {
    /// Creates a reconciler for one resource schema.
    #[must_use]
    pub fn new(
        schema: Arc<ResourceSchema>,
        dialect: Arc<dyn StatementDialect>,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            builder: CommandBuilder::new(Arc::clone(&schema), dialect),
            schema,
            diff_engine: DiffEngine::new(),
            executor,
            store,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            holder: generate_holder_id(),
        }
    }

    /// Sets the upper bound for a single executor call.
    ///
    /// A call that runs longer leaves its object tainted.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the lease holder name recorded in store locks.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Returns the schema this reconciler manages.
    #[must_use]
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    // ------------------------------------------------------------------
    // Lifecycle passes
    // ------------------------------------------------------------------

    /// Creates a new object from `desired`.
    ///
    /// # Errors
    ///
    /// - schema violation: nothing is stored or executed
    /// - store failure on the write-ahead record: nothing is executed
    /// - executor failure: the record is removed
    /// - ambiguous outcome (including cancellation and timeout): the record
    ///   is left tainted
    pub async fn create(&self, desired: &AttributeSet, cancel: &CancelSignal) -> Result<Created> {
        self.create_addressed(None, desired, cancel).await
    }

    /// Like [`Reconciler::create`], recording the operator-facing name of
    /// the object so it can be found again from configuration.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::create`].
    pub async fn create_addressed(
        &self,
        address: Option<&str>,
        desired: &AttributeSet,
        cancel: &CancelSignal,
    ) -> Result<Created> {
        let diff = self
            .diff_engine
            .compute_diff(desired, &AttributeSet::new(), &self.schema)?;
        let commands = self.builder.build(&diff, LifecycleAction::Create, None)?;
        let [command] = commands.as_slice() else {
            return Err(unexpected_commands(&commands, diff.mode()));
        };

        let identity = ResourceIdentity::generate();
        self.leased(
            &identity,
            self.create_pass(
                identity.clone(),
                address.map(String::from),
                diff.target(),
                command,
                cancel,
            ),
        )
        .await
    }

    /// Reads the object back and refreshes its record.
    ///
    /// A missing record is not an error: the result is simply not present.
    /// Reading a tainted or interrupted record repairs it.
    ///
    /// # Errors
    ///
    /// Returns an executor error if the read fails or is ambiguous; the
    /// stored state is left as it was.
    pub async fn read(&self, identity: &ResourceIdentity, cancel: &CancelSignal) -> Result<ReadResult> {
        self.leased(identity, self.read_pass(identity, cancel)).await
    }

    /// Repairs a tainted or interrupted record by reading the object back.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::read`].
    pub async fn repair(&self, identity: &ResourceIdentity, cancel: &CancelSignal) -> Result<ReadResult> {
        info!("Repairing {identity}");
        let result = self.read(identity, cancel).await?;
        match result.state {
            ReconciliationState::Tainted => warn!("{identity} is still tainted after repair"),
            state => info!("{identity} repaired: now {state}"),
        }
        Ok(result)
    }

    /// Converges an existing object towards `desired`.
    ///
    /// # Errors
    ///
    /// - unknown identity, or a record that needs repair first
    /// - schema violation: nothing is stored or executed
    /// - executor failure or ambiguity: the record is left tainted (a failed
    ///   re-create after a successful drop leaves the object absent)
    pub async fn update(
        &self,
        identity: &ResourceIdentity,
        desired: &AttributeSet,
        cancel: &CancelSignal,
    ) -> Result<Updated> {
        self.leased(identity, self.update_pass(identity, desired, cancel)).await
    }

    /// Deletes the object. Deleting an unknown identity succeeds.
    ///
    /// # Errors
    ///
    /// Returns an executor error if the drop fails or is ambiguous; the
    /// record is left tainted.
    pub async fn delete(&self, identity: &ResourceIdentity, cancel: &CancelSignal) -> Result<()> {
        self.leased(identity, self.delete_pass(identity, cancel)).await
    }

    // ------------------------------------------------------------------
    // Plans
    // ------------------------------------------------------------------

    /// Previews the pass `apply` would run for one configured resource.
    ///
    /// # Errors
    ///
    /// Returns a schema violation or planning error.
    pub fn plan_apply(
        &self,
        address: &str,
        desired: &AttributeSet,
        record: Option<&StateRecord>,
    ) -> Result<ResourcePlan> {
        let type_name = self.schema.type_name();
        let Some(record) = record else {
            let diff = self
                .diff_engine
                .compute_diff(desired, &AttributeSet::new(), &self.schema)?;
            let commands = self.builder.build(&diff, LifecycleAction::Create, None)?;
            return Ok(ResourcePlan::from_diff(address, type_name, None, &diff, commands));
        };

        if record.state.needs_repair() {
            return Ok(ResourcePlan::repair(
                address,
                type_name,
                record.identity.clone(),
                record.state,
            ));
        }

        let diff = self
            .diff_engine
            .compute_diff(desired, &record.attributes, &self.schema)?;
        let commands = self
            .builder
            .build(&diff, LifecycleAction::Update, Some(&record.identity))?;
        debug!("Planned {address}: {diff}");
        Ok(ResourcePlan::from_diff(
            address,
            type_name,
            Some(record.identity.clone()),
            &diff,
            commands,
        ))
    }

    /// Previews the deletion of a stored object.
    ///
    /// # Errors
    ///
    /// Returns a planning error if the stored attributes cannot address it.
    pub fn plan_delete(&self, record: &StateRecord) -> Result<ResourcePlan> {
        let diff = Diff::teardown(&record.attributes);
        let commands = self
            .builder
            .build(&diff, LifecycleAction::Delete, Some(&record.identity))?;
        let address = record
            .address
            .clone()
            .unwrap_or_else(|| record.identity.to_string());
        Ok(ResourcePlan::from_diff(
            address,
            &record.resource_type,
            Some(record.identity.clone()),
            &diff,
            commands,
        ))
    }

    // ------------------------------------------------------------------
    // Pass bodies (run under the identity's lease)
    // ------------------------------------------------------------------

    async fn create_pass(
        &self,
        identity: ResourceIdentity,
        address: Option<String>,
        attributes: &AttributeSet,
        command: &Command,
        cancel: &CancelSignal,
    ) -> Result<Created> {
        let mut record = StateRecord::new(
            identity.clone(),
            self.schema.type_name(),
            address,
            ReconciliationState::Creating,
            attributes.clone(),
        );
        // Write-ahead: a crash from here on leaves a record to repair.
        self.store.save(&record).await?;
        info!("Creating {} {identity}", self.schema.type_name());

        match self.execute(command, cancel).await {
            ExecOutcome::Success(reported) => {
                let attributes = self.with_computed(attributes, reported.as_ref());
                record.set_attributes(attributes.clone());
                transition(&mut record, Operation::Create, ReconciliationState::Present, None)?;
                self.store.save(&record).await?;
                info!("Created {identity}");
                Ok(Created { identity, attributes })
            }
            ExecOutcome::Failure(message) => {
                transition(&mut record, Operation::Create, ReconciliationState::Absent, None)?;
                self.store.delete(&identity).await?;
                error!("Create of {identity} failed: {message}");
                Err(failure(command, message))
            }
            ExecOutcome::Absent => {
                transition(&mut record, Operation::Create, ReconciliationState::Absent, None)?;
                self.store.delete(&identity).await?;
                Err(failure(command, String::from("object reported absent after create")))
            }
            ExecOutcome::Ambiguous(message) => {
                self.taint(&mut record, Operation::Create, command, message).await
            }
        }
    }

    async fn read_pass(&self, identity: &ResourceIdentity, cancel: &CancelSignal) -> Result<ReadResult> {
        let Some(mut record) = self.load(identity).await? else {
            debug!("No record for {identity}; treating as absent");
            return Ok(ReadResult::absent());
        };

        let repairing = record.state.needs_repair();
        let operation = if repairing { Operation::Repair } else { Operation::Read };
        if settle_interrupted(&mut record, operation)? {
            self.store.save(&record).await?;
        }

        let command = self.builder.read(&record.attributes, identity)?;
        match self.execute(&command, cancel).await {
            ExecOutcome::Success(Some(remote)) => {
                let attributes = self.merge_remote(&record.attributes, &remote);
                if attributes != record.attributes {
                    debug!("Refreshed attributes of {identity}");
                }
                record.set_attributes(attributes.clone());
                transition(&mut record, operation, ReconciliationState::Present, None)?;
                self.store.save(&record).await?;
                Ok(ReadResult {
                    attributes,
                    present: true,
                    state: ReconciliationState::Present,
                })
            }
            ExecOutcome::Success(None) if repairing => {
                let message = String::from("object exists but reported no attributes");
                transition(
                    &mut record,
                    operation,
                    ReconciliationState::Tainted,
                    Some(message),
                )?;
                self.store.save(&record).await?;
                Ok(ReadResult {
                    attributes: record.attributes,
                    present: true,
                    state: ReconciliationState::Tainted,
                })
            }
            ExecOutcome::Success(None) => Ok(ReadResult {
                attributes: record.attributes,
                present: true,
                state: record.state,
            }),
            ExecOutcome::Absent => {
                warn!("{identity} no longer exists remotely; removing its record");
                transition(&mut record, operation, ReconciliationState::Absent, None)?;
                self.store.delete(identity).await?;
                Ok(ReadResult::absent())
            }
            ExecOutcome::Failure(message) => Err(failure(&command, message)),
            ExecOutcome::Ambiguous(message) => Err(ambiguous(&command, message)),
        }
    }

    async fn update_pass(
        &self,
        identity: &ResourceIdentity,
        desired: &AttributeSet,
        cancel: &CancelSignal,
    ) -> Result<Updated> {
        let Some(mut record) = self.load(identity).await? else {
            return Err(LifecycleError::UnknownIdentity {
                identity: identity.to_string(),
            }
            .into());
        };
        if record.state.needs_repair() {
            return Err(LifecycleError::NeedsRepair {
                identity: identity.to_string(),
                state: record.state.to_string(),
            }
            .into());
        }

        let diff = self
            .diff_engine
            .compute_diff(desired, &record.attributes, &self.schema)?;
        let commands = self
            .builder
            .build(&diff, LifecycleAction::Update, Some(identity))?;

        match (diff.mode(), commands.as_slice()) {
            (ExecutionMode::NoOp, []) => {
                debug!("{identity} is converged");
                Ok(Updated {
                    identity: identity.clone(),
                    attributes: record.attributes,
                    replaced: false,
                })
            }
            (ExecutionMode::InPlace, [alter]) => {
                let attributes = self.with_computed(diff.target(), Some(&record.attributes));
                self.alter_in_place(&mut record, attributes, alter, cancel).await
            }
            (ExecutionMode::Replace, [drop, create]) => {
                self.replace(&mut record, &diff, drop, create, cancel).await
            }
            (mode, _) => Err(unexpected_commands(&commands, mode)),
        }
    }

    async fn alter_in_place(
        &self,
        record: &mut StateRecord,
        attributes: AttributeSet,
        alter: &Command,
        cancel: &CancelSignal,
    ) -> Result<Updated> {
        transition(record, Operation::Update, ReconciliationState::Updating, None)?;
        self.store.save(record).await?;
        info!("Updating {} in place", record.identity);

        match self.execute(alter, cancel).await {
            ExecOutcome::Success(_) => {
                record.set_attributes(attributes.clone());
                transition(record, Operation::Update, ReconciliationState::Present, None)?;
                self.store.save(record).await?;
                Ok(Updated {
                    identity: record.identity.clone(),
                    attributes,
                    replaced: false,
                })
            }
            ExecOutcome::Failure(message) => {
                self.fail(record, Operation::Update, alter, message).await
            }
            ExecOutcome::Absent => {
                self.fail(record, Operation::Update, alter, String::from("object not found"))
                    .await
            }
            ExecOutcome::Ambiguous(message) => {
                self.taint(record, Operation::Update, alter, message).await
            }
        }
    }

    async fn replace(
        &self,
        record: &mut StateRecord,
        diff: &Diff,
        drop: &Command,
        create: &Command,
        cancel: &CancelSignal,
    ) -> Result<Updated> {
        transition(record, Operation::Replace, ReconciliationState::Updating, None)?;
        self.store.save(record).await?;
        info!("Replacing {}: {diff}", record.identity);

        match self.execute(drop, cancel).await {
            ExecOutcome::Success(_) | ExecOutcome::Absent => {}
            ExecOutcome::Failure(message) => {
                return self.fail(record, Operation::Replace, drop, message).await;
            }
            ExecOutcome::Ambiguous(message) => {
                return self.taint(record, Operation::Replace, drop, message).await;
            }
        }

        transition(record, Operation::Replace, ReconciliationState::Absent, None)?;
        self.store.delete(&record.identity).await?;
        debug!("Dropped {}; creating replacement", record.identity);

        let identity = ResourceIdentity::generate();
        let created = self
            .leased(
                &identity,
                self.create_pass(
                    identity.clone(),
                    record.address.clone(),
                    diff.target(),
                    create,
                    cancel,
                ),
            )
            .await?;
        info!("Replaced {} with {}", record.identity, created.identity);

        Ok(Updated {
            identity: created.identity,
            attributes: created.attributes,
            replaced: true,
        })
    }

    async fn delete_pass(&self, identity: &ResourceIdentity, cancel: &CancelSignal) -> Result<()> {
        let Some(mut record) = self.load(identity).await? else {
            debug!("No record for {identity}; already absent");
            return Ok(());
        };
        settle_interrupted(&mut record, Operation::Delete)?;

        let diff = Diff::teardown(&record.attributes);
        let commands = self
            .builder
            .build(&diff, LifecycleAction::Delete, Some(identity))?;
        let [drop] = commands.as_slice() else {
            return Err(unexpected_commands(&commands, diff.mode()));
        };

        transition(&mut record, Operation::Delete, ReconciliationState::Deleting, None)?;
        self.store.save(&record).await?;
        info!("Deleting {identity}");

        match self.execute(drop, cancel).await {
            ExecOutcome::Success(_) | ExecOutcome::Absent => {
                transition(&mut record, Operation::Delete, ReconciliationState::Absent, None)?;
                self.store.delete(identity).await?;
                info!("Deleted {identity}");
                Ok(())
            }
            ExecOutcome::Failure(message) => {
                self.fail(&mut record, Operation::Delete, drop, message).await
            }
            ExecOutcome::Ambiguous(message) => {
                self.taint(&mut record, Operation::Delete, drop, message).await
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Runs `pass` while holding the lease of `identity`.
    ///
    /// The lease is renewed every third of its length until the pass ends.
    async fn leased<T>(
        &self,
        identity: &ResourceIdentity,
        pass: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let lease = self.store.acquire_lock(identity, &self.holder).await?;

        let every = (self.store.lease_ttl() / 3).max(Duration::from_millis(1));
        let mut renewal = tokio::time::interval_at(Instant::now() + every, every);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pass = std::pin::pin!(pass);

        let result = loop {
            tokio::select! {
                result = &mut pass => break result,
                _ = renewal.tick() => {
                    match self.store.renew_lock(identity, &lease.lock_id).await {
                        Ok(renewed) => debug!("Renewed lease on {identity} until {}", renewed.expires_at),
                        Err(e) => warn!("Failed to renew lease on {identity}: {e}"),
                    }
                }
            }
        };

        if let Err(e) = self.store.release_lock(identity, &lease.lock_id).await {
            warn!("Failed to release lock on {identity}: {e}");
        }
        result
    }

    async fn load(&self, identity: &ResourceIdentity) -> Result<Option<StateRecord>> {
        let record = self.store.load(identity).await?;
        if let Some(r) = &record {
            if r.resource_type != self.schema.type_name() {
                return Err(LifecycleError::ResourceTypeMismatch {
                    identity: identity.to_string(),
                    expected: self.schema.type_name().to_string(),
                    found: r.resource_type.clone(),
                }
                .into());
            }
        }
        Ok(record)
    }

    /// Sends one command, racing it against cancellation and the timeout.
    async fn execute(&self, command: &Command, cancel: &CancelSignal) -> ExecOutcome {
        debug!(
            executor = self.executor.name(),
            statement = %command.redacted(),
            "Executing {} command",
            command.kind()
        );

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                ExecOutcome::Ambiguous(String::from("cancelled while in flight"))
            }
            () = tokio::time::sleep(self.command_timeout) => ExecOutcome::Ambiguous(format!(
                "no answer within {}s",
                self.command_timeout.as_secs_f64()
            )),
            outcome = self.executor.execute(command) => outcome,
        };

        debug!("{} command outcome: {outcome}", command.kind());
        outcome
    }

    /// Adds the computed values of `reported` to `attributes`.
    fn with_computed(&self, attributes: &AttributeSet, reported: Option<&AttributeSet>) -> AttributeSet {
        let mut merged = attributes.clone();
        if let Some(reported) = reported {
            for (name, value) in reported.iter() {
                if !value.is_unset() && self.schema.get(name).is_some_and(AttributeSpec::is_computed) {
                    merged.insert(name, value.clone());
                }
            }
        }
        merged
    }

    /// Overlays what the remote system reported on the stored attributes.
    ///
    /// Attributes the remote system does not report keep their stored value.
    fn merge_remote(&self, stored: &AttributeSet, remote: &AttributeSet) -> AttributeSet {
        let mut merged = stored.clone();
        for (name, value) in remote.iter() {
            if !value.is_unset() && self.schema.get(name).is_some() {
                merged.insert(name, value.clone());
            }
        }
        merged
    }

    /// Records a definitive failure on an existing object and surfaces it.
    async fn fail<T>(
        &self,
        record: &mut StateRecord,
        operation: Operation,
        command: &Command,
        message: String,
    ) -> Result<T> {
        error!("{operation} of {} failed: {message}", record.identity);
        transition(
            record,
            operation,
            ReconciliationState::Tainted,
            Some(message.clone()),
        )?;
        self.store.save(record).await?;
        Err(failure(command, message))
    }

    /// Records an unknown remote outcome and surfaces it.
    async fn taint<T>(
        &self,
        record: &mut StateRecord,
        operation: Operation,
        command: &Command,
        message: String,
    ) -> Result<T> {
        warn!(
            "{operation} of {} has an unknown outcome, marking tainted: {message}",
            record.identity
        );
        transition(
            record,
            operation,
            ReconciliationState::Tainted,
            Some(message.clone()),
        )?;
        self.store.save(record).await?;
        Err(ambiguous(command, message))
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("resource_type", &self.schema.type_name())
            .field("executor", &self.executor.name())
            .field("store", &self.store.backend_type())
            .field("command_timeout", &self.command_timeout)
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}

/// Validates and records a state change.
fn transition(
    record: &mut StateRecord,
    operation: Operation,
    to: ReconciliationState,
    error: Option<String>,
) -> Result<()> {
    validate_transition(record.state, to)?;
    record.record(operation, to, error);
    Ok(())
}

/// Marks a record left in flight by an earlier pass as tainted.
///
/// Returns true if the record changed.
fn settle_interrupted(record: &mut StateRecord, operation: Operation) -> Result<bool> {
    if !record.state.is_in_flight() {
        return Ok(false);
    }
    let message = format!("interrupted while {}", record.state);
    warn!("{} was {message}; its remote outcome is unknown", record.identity);
    transition(record, operation, ReconciliationState::Tainted, Some(message))?;
    Ok(true)
}

fn failure(command: &Command, message: String) -> VantageError {
    ExecutorError::Failure {
        command: command.to_string(),
        message,
    }
    .into()
}

fn ambiguous(command: &Command, message: String) -> VantageError {
    ExecutorError::Ambiguous {
        command: command.to_string(),
        message,
    }
    .into()
}

fn unexpected_commands(commands: &[Command], mode: ExecutionMode) -> VantageError {
    VantageError::internal(format!(
        "unexpected command list of length {} for a {mode} diff",
        commands.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SchemaError, StateError};
    use crate::executor::cancel_pair;
    use crate::resource::compute_profile::{
        self, ComputeProfileDialect, GROUP, NAME, PROFILE_STATE, STRATEGY,
    };
    use crate::state::{LockInfo, MemoryStateStore};
    use async_trait::async_trait;
    use mockall::mock;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers commands from a script and remembers what it was sent.
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<VecDeque<ExecOutcome>>,
        statements: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(outcomes: impl IntoIterator<Item = ExecOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                statements: Mutex::default(),
            })
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().expect("statements").clone()
        }
    }

    #[async_trait]
    impl RemoteExecutor for Scripted {
        async fn execute(&self, command: &Command) -> ExecOutcome {
            self.statements
                .lock()
                .expect("statements")
                .push(command.statement().to_string());
            self.outcomes
                .lock()
                .expect("outcomes")
                .pop_front()
                .unwrap_or_else(|| ExecOutcome::Failure(String::from("unscripted command")))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl RemoteExecutor for Hanging {
        async fn execute(&self, _command: &Command) -> ExecOutcome {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    /// Answers every command with success after a delay.
    struct Slow(Duration);

    #[async_trait]
    impl RemoteExecutor for Slow {
        async fn execute(&self, _command: &Command) -> ExecOutcome {
            tokio::time::sleep(self.0).await;
            ExecOutcome::Success(None)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    mock! {
        Executor {}

        #[async_trait]
        impl RemoteExecutor for Executor {
            async fn execute(&self, command: &Command) -> ExecOutcome;
            fn name(&self) -> &'static str;
        }
    }

    /// A store whose writes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl StateStore for ReadOnlyStore {
        async fn load(&self, _identity: &ResourceIdentity) -> Result<Option<StateRecord>> {
            Ok(None)
        }

        async fn save(&self, _record: &StateRecord) -> Result<()> {
            Err(StateError::unavailable("read-only filesystem").into())
        }

        async fn delete(&self, _identity: &ResourceIdentity) -> Result<()> {
            Err(StateError::unavailable("read-only filesystem").into())
        }

        async fn list(&self) -> Result<Vec<StateRecord>> {
            Ok(Vec::new())
        }

        async fn acquire_lock(&self, identity: &ResourceIdentity, holder: &str) -> Result<LockInfo> {
            Ok(LockInfo::new(identity, holder))
        }

        async fn renew_lock(&self, identity: &ResourceIdentity, _lock_id: &str) -> Result<LockInfo> {
            Ok(LockInfo::new(identity, "read-only"))
        }

        async fn release_lock(&self, _identity: &ResourceIdentity, _lock_id: &str) -> Result<()> {
            Ok(())
        }

        async fn get_lock_info(&self, _identity: &ResourceIdentity) -> Result<Option<LockInfo>> {
            Ok(None)
        }

        async fn force_unlock(&self, _identity: &ResourceIdentity) -> Result<()> {
            Ok(())
        }

        fn backend_type(&self) -> &'static str {
            "read-only"
        }
    }

    fn reconciler(executor: Arc<dyn RemoteExecutor>, store: Arc<dyn StateStore>) -> Reconciler {
        Reconciler::new(
            Arc::new(compute_profile::schema()),
            Arc::new(ComputeProfileDialect::new()),
            executor,
            store,
        )
        .with_holder("test")
    }

    fn profile(group: &str) -> AttributeSet {
        AttributeSet::new().with(NAME, "cp1").with(GROUP, group)
    }

    async fn stored(store: &MemoryStateStore, state: ReconciliationState, attributes: AttributeSet) -> ResourceIdentity {
        let record = StateRecord::new(
            ResourceIdentity::generate(),
            compute_profile::RESOURCE_TYPE,
            Some(String::from("analytics")),
            state,
            attributes,
        );
        store.save(&record).await.expect("save");
        record.identity
    }

    async fn state_of(store: &MemoryStateStore, identity: &ResourceIdentity) -> Option<ReconciliationState> {
        store.load(identity).await.expect("load").map(|r| r.state)
    }

    #[tokio::test]
    async fn test_create_records_present_with_computed_values() {
        let store = Arc::new(MemoryStateStore::new());
        let executor = Scripted::new([ExecOutcome::Success(Some(
            AttributeSet::new().with(PROFILE_STATE, "ACTIVE").with("unknown_column", "x"),
        ))]);
        let reconciler = reconciler(executor.clone(), store.clone());

        let desired = profile("cg1").with(STRATEGY, "");
        let created = reconciler
            .create(&desired, &CancelSignal::none())
            .await
            .expect("create");

        assert_eq!(executor.statements(), ["CREATE COMPUTE PROFILE cp1 IN cg1"]);
        assert_eq!(created.attributes.get(PROFILE_STATE).and_then(|v| v.as_str()), Some("ACTIVE"));
        assert!(created.attributes.get("unknown_column").is_none());

        let record = store.load(&created.identity).await.expect("load").expect("record");
        assert_eq!(record.state, ReconciliationState::Present);
        assert_eq!(record.attributes, created.attributes);
        assert!(store.get_lock_info(&created.identity).await.expect("lock").is_none());
    }

    #[tokio::test]
    async fn test_create_failure_leaves_no_record() {
        let store = Arc::new(MemoryStateStore::new());
        let executor = Scripted::new([ExecOutcome::Failure(String::from("3803 already exists"))]);
        let reconciler = reconciler(executor, store.clone());

        let err = reconciler
            .create(&profile("cg1"), &CancelSignal::none())
            .await
            .expect_err("failure");

        assert!(matches!(err, VantageError::Executor(ExecutorError::Failure { .. })));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_create_ambiguous_leaves_tainted_record() {
        let store = Arc::new(MemoryStateStore::new());
        let executor = Scripted::new([ExecOutcome::Ambiguous(String::from("connection reset"))]);
        let reconciler = reconciler(executor, store.clone());

        let err = reconciler
            .create(&profile("cg1"), &CancelSignal::none())
            .await
            .expect_err("ambiguous");

        assert!(err.is_ambiguous());
        let records = store.list().await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, ReconciliationState::Tainted);
        assert_eq!(records[0].last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_missing_required_attribute_never_reaches_executor() {
        let store = Arc::new(MemoryStateStore::new());
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), store.clone());

        let desired = AttributeSet::new().with(GROUP, "cg1");
        let err = reconciler
            .create(&desired, &CancelSignal::none())
            .await
            .expect_err("schema violation");

        assert!(err.is_schema_violation());
        assert!(matches!(
            err,
            VantageError::Schema(SchemaError::MissingRequired { ref name }) if name == NAME
        ));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_write_ahead_failure_aborts_before_execution() {
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), Arc::new(ReadOnlyStore));

        let err = reconciler
            .create(&profile("cg1"), &CancelSignal::none())
            .await
            .expect_err("store failure");

        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn test_replacement_drops_then_creates_with_fresh_identity() {
        let store = Arc::new(MemoryStateStore::new());
        let old = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let executor = Scripted::new([ExecOutcome::Success(None), ExecOutcome::Success(None)]);
        let reconciler = reconciler(executor.clone(), store.clone());

        let updated = reconciler
            .update(&old, &profile("cg2"), &CancelSignal::none())
            .await
            .expect("replace");

        assert_eq!(
            executor.statements(),
            ["DROP COMPUTE PROFILE cp1 IN cg1", "CREATE COMPUTE PROFILE cp1 IN cg2"]
        );
        assert!(updated.replaced);
        assert_ne!(updated.identity, old);
        assert_eq!(state_of(&store, &old).await, None);
        assert_eq!(state_of(&store, &updated.identity).await, Some(ReconciliationState::Present));

        let record = store.load(&updated.identity).await.expect("load").expect("record");
        assert_eq!(record.address.as_deref(), Some("analytics"));
    }

    #[tokio::test]
    async fn test_replacement_with_failed_drop_taints_old_identity() {
        let store = Arc::new(MemoryStateStore::new());
        let old = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let executor = Scripted::new([ExecOutcome::Failure(String::from("in use"))]);
        let reconciler = reconciler(executor.clone(), store.clone());

        reconciler
            .update(&old, &profile("cg2"), &CancelSignal::none())
            .await
            .expect_err("drop failed");

        assert_eq!(executor.statements().len(), 1);
        assert_eq!(state_of(&store, &old).await, Some(ReconciliationState::Tainted));
    }

    #[tokio::test]
    async fn test_in_place_update_keeps_identity_and_computed_values() {
        let store = Arc::new(MemoryStateStore::new());
        let old = stored(
            &store,
            ReconciliationState::Present,
            profile("cg1").with(STRATEGY, "SMALL").with(PROFILE_STATE, "ACTIVE"),
        )
        .await;
        let executor = Scripted::new([ExecOutcome::Success(None)]);
        let reconciler = reconciler(executor.clone(), store.clone());

        let updated = reconciler
            .update(&old, &profile("cg1").with(STRATEGY, "LARGE"), &CancelSignal::none())
            .await
            .expect("update");

        assert_eq!(
            executor.statements(),
            ["ALTER COMPUTE PROFILE cp1 IN cg1, INSTANCE TYPE = LARGE"]
        );
        assert!(!updated.replaced);
        assert_eq!(updated.identity, old);
        assert_eq!(updated.attributes.get(STRATEGY).and_then(|v| v.as_str()), Some("LARGE"));
        assert_eq!(updated.attributes.get(PROFILE_STATE).and_then(|v| v.as_str()), Some("ACTIVE"));
        assert_eq!(state_of(&store, &old).await, Some(ReconciliationState::Present));
    }

    #[tokio::test]
    async fn test_converged_update_sends_nothing() {
        let store = Arc::new(MemoryStateStore::new());
        let old = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), store.clone());

        let updated = reconciler
            .update(&old, &profile("cg1"), &CancelSignal::none())
            .await
            .expect("no-op");

        assert_eq!(updated.identity, old);
        assert_eq!(state_of(&store, &old).await, Some(ReconciliationState::Present));
    }

    #[tokio::test]
    async fn test_update_of_unknown_identity_fails() {
        let store = Arc::new(MemoryStateStore::new());
        let reconciler = reconciler(Scripted::new([]), store);

        let err = reconciler
            .update(&ResourceIdentity::generate(), &profile("cg1"), &CancelSignal::none())
            .await
            .expect_err("unknown");

        assert!(matches!(err, VantageError::Lifecycle(LifecycleError::UnknownIdentity { .. })));
    }

    #[tokio::test]
    async fn test_delete_of_already_absent_object_succeeds() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let executor = Scripted::new([ExecOutcome::Absent]);
        let reconciler = reconciler(executor.clone(), store.clone());

        reconciler
            .delete(&id, &CancelSignal::none())
            .await
            .expect("already absent");

        assert_eq!(executor.statements(), ["DROP COMPUTE PROFILE cp1 IN cg1"]);
        assert_eq!(state_of(&store, &id).await, None);
    }

    #[tokio::test]
    async fn test_delete_without_record_sends_nothing() {
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), Arc::new(MemoryStateStore::new()));

        reconciler
            .delete(&ResourceIdentity::generate(), &CancelSignal::none())
            .await
            .expect("nothing to delete");
    }

    #[tokio::test]
    async fn test_failed_delete_taints_record() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let reconciler = reconciler(
            Scripted::new([ExecOutcome::Failure(String::from("permission denied"))]),
            store.clone(),
        );

        reconciler
            .delete(&id, &CancelSignal::none())
            .await
            .expect_err("failure");

        let record = store.load(&id).await.expect("load").expect("record");
        assert_eq!(record.state, ReconciliationState::Tainted);
        assert_eq!(record.last_error.as_deref(), Some("permission denied"));
    }

    #[tokio::test]
    async fn test_ambiguous_update_then_read_repairs() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(
            &store,
            ReconciliationState::Present,
            profile("cg1").with(STRATEGY, "SMALL"),
        )
        .await;
        let executor = Scripted::new([
            ExecOutcome::Ambiguous(String::from("timed out")),
            ExecOutcome::Success(Some(
                profile("cg1").with(STRATEGY, "LARGE").with(PROFILE_STATE, "ACTIVE"),
            )),
        ]);
        let reconciler = reconciler(executor.clone(), store.clone());
        let desired = profile("cg1").with(STRATEGY, "LARGE");

        let err = reconciler
            .update(&id, &desired, &CancelSignal::none())
            .await
            .expect_err("ambiguous");
        assert!(err.is_ambiguous());
        assert_eq!(state_of(&store, &id).await, Some(ReconciliationState::Tainted));

        let err = reconciler
            .update(&id, &desired, &CancelSignal::none())
            .await
            .expect_err("needs repair");
        assert!(matches!(err, VantageError::Lifecycle(LifecycleError::NeedsRepair { .. })));

        let read = reconciler.read(&id, &CancelSignal::none()).await.expect("read");
        assert!(read.present);
        assert_eq!(read.state, ReconciliationState::Present);
        assert_eq!(read.attributes.get(STRATEGY).and_then(|v| v.as_str()), Some("LARGE"));

        let record = store.load(&id).await.expect("load").expect("record");
        assert_eq!(record.state, ReconciliationState::Present);
        assert!(record.last_error.is_none());
        assert_eq!(executor.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_read_of_vanished_object_removes_record() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let reconciler = reconciler(Scripted::new([ExecOutcome::Absent]), store.clone());

        let read = reconciler.read(&id, &CancelSignal::none()).await.expect("read");

        assert!(!read.present);
        assert!(read.attributes.is_empty());
        assert_eq!(state_of(&store, &id).await, None);
    }

    #[tokio::test]
    async fn test_read_without_record_is_not_present() {
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), Arc::new(MemoryStateStore::new()));

        let read = reconciler
            .read(&ResourceIdentity::generate(), &CancelSignal::none())
            .await
            .expect("read");

        assert!(!read.present);
        assert_eq!(read.state, ReconciliationState::Absent);
    }

    #[tokio::test]
    async fn test_failed_read_leaves_state_unchanged() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let reconciler = reconciler(
            Scripted::new([ExecOutcome::Failure(String::from("HTTP 401"))]),
            store.clone(),
        );

        reconciler
            .read(&id, &CancelSignal::none())
            .await
            .expect_err("failure");

        assert_eq!(state_of(&store, &id).await, Some(ReconciliationState::Present));
    }

    #[tokio::test]
    async fn test_interrupted_record_is_repaired_by_read() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Creating, profile("cg1")).await;
        let reconciler = reconciler(
            Scripted::new([ExecOutcome::Success(Some(profile("cg1")))]),
            store.clone(),
        );

        let read = reconciler.repair(&id, &CancelSignal::none()).await.expect("repair");

        assert_eq!(read.state, ReconciliationState::Present);
        let record = store.load(&id).await.expect("load").expect("record");
        let operations: Vec<_> = record.history.iter().map(|h| (h.operation, h.to)).collect();
        assert_eq!(
            operations,
            [
                (Operation::Repair, ReconciliationState::Tainted),
                (Operation::Repair, ReconciliationState::Present),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_create_is_tainted() {
        let store = Arc::new(MemoryStateStore::new());
        let reconciler = reconciler(Arc::new(Hanging), store.clone());
        let (handle, signal) = cancel_pair();

        let desired = profile("cg1");
        let pass = reconciler.create(&desired, &signal);
        let (result, ()) = tokio::join!(pass, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        assert!(result.expect_err("cancelled").is_ambiguous());
        let records = store.list().await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, ReconciliationState::Tainted);
    }

    #[tokio::test]
    async fn test_timed_out_delete_is_tainted() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let reconciler = reconciler(Arc::new(Hanging), store.clone())
            .with_command_timeout(Duration::from_millis(20));

        let err = reconciler
            .delete(&id, &CancelSignal::none())
            .await
            .expect_err("timed out");

        assert!(err.is_ambiguous());
        assert_eq!(state_of(&store, &id).await, Some(ReconciliationState::Tainted));
    }

    #[tokio::test]
    async fn test_leased_identity_is_not_touched() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        store.acquire_lock(&id, "someone-else").await.expect("lock");
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), store.clone());

        let err = reconciler
            .delete(&id, &CancelSignal::none())
            .await
            .expect_err("locked");

        assert!(err.is_store_failure());
        assert_eq!(state_of(&store, &id).await, Some(ReconciliationState::Present));
    }

    #[tokio::test]
    async fn test_plans_do_not_execute() {
        let store = Arc::new(MemoryStateStore::new());
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        let reconciler = reconciler(Arc::new(executor), store.clone());

        let create = reconciler
            .plan_apply("analytics", &profile("cg1"), None)
            .expect("plan");
        assert_eq!(create.action, crate::planner::ActionType::Create);
        assert_eq!(create.commands.len(), 1);

        let id = stored(&store, ReconciliationState::Tainted, profile("cg1")).await;
        let record = store.load(&id).await.expect("load").expect("record");
        let repair = reconciler
            .plan_apply("analytics", &profile("cg2"), Some(&record))
            .expect("plan");
        assert_eq!(repair.action, crate::planner::ActionType::Repair);

        let delete = reconciler.plan_delete(&record).expect("plan");
        assert_eq!(delete.action, crate::planner::ActionType::Delete);
        assert_eq!(delete.commands[0].statement(), "DROP COMPUTE PROFILE cp1 IN cg1");
    }

    #[tokio::test]
    async fn test_replacement_with_failed_create_leaves_nothing_stored() {
        let store = Arc::new(MemoryStateStore::new());
        let old = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let executor = Scripted::new([
            ExecOutcome::Success(None),
            ExecOutcome::Failure(String::from("3706 syntax error")),
        ]);
        let reconciler = reconciler(executor.clone(), store.clone());

        let err = reconciler
            .update(&old, &profile("cg2"), &CancelSignal::none())
            .await
            .expect_err("create failed");

        assert!(matches!(err, VantageError::Executor(ExecutorError::Failure { .. })));
        assert_eq!(executor.statements().len(), 2);
        assert_eq!(state_of(&store, &old).await, None);
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_replacement_with_ambiguous_create_taints_new_identity() {
        let store = Arc::new(MemoryStateStore::new());
        let old = stored(&store, ReconciliationState::Present, profile("cg1")).await;
        let executor = Scripted::new([
            ExecOutcome::Success(None),
            ExecOutcome::Ambiguous(String::from("gateway timeout")),
        ]);
        let reconciler = reconciler(executor, store.clone());

        let err = reconciler
            .update(&old, &profile("cg2"), &CancelSignal::none())
            .await
            .expect_err("ambiguous");

        assert!(err.is_ambiguous());
        assert_eq!(state_of(&store, &old).await, None);
        let records = store.list().await.expect("list");
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].identity, old);
        assert_eq!(records[0].state, ReconciliationState::Tainted);
        assert_eq!(records[0].address.as_deref(), Some("analytics"));
        assert_eq!(
            records[0].attributes.get(GROUP).and_then(|v| v.as_str()),
            Some("cg2")
        );
    }

    #[tokio::test]
    async fn test_failed_alter_taints_record() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1").with(STRATEGY, "SMALL")).await;
        let reconciler = reconciler(
            Scripted::new([ExecOutcome::Failure(String::from("invalid instance type"))]),
            store.clone(),
        );

        let err = reconciler
            .update(&id, &profile("cg1").with(STRATEGY, "HUGE"), &CancelSignal::none())
            .await
            .expect_err("failure");

        assert!(matches!(err, VantageError::Executor(ExecutorError::Failure { .. })));
        let record = store.load(&id).await.expect("load").expect("record");
        assert_eq!(record.state, ReconciliationState::Tainted);
        assert_eq!(record.last_error.as_deref(), Some("invalid instance type"));
        assert_eq!(record.attributes.get(STRATEGY).and_then(|v| v.as_str()), Some("SMALL"));
    }

    #[tokio::test]
    async fn test_alter_of_missing_object_taints_record() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Present, profile("cg1").with(STRATEGY, "SMALL")).await;
        let reconciler = reconciler(Scripted::new([ExecOutcome::Absent]), store.clone());

        let err = reconciler
            .update(&id, &profile("cg1").with(STRATEGY, "LARGE"), &CancelSignal::none())
            .await
            .expect_err("absent");

        assert!(!err.is_ambiguous());
        let record = store.load(&id).await.expect("load").expect("record");
        assert_eq!(record.state, ReconciliationState::Tainted);
        assert_eq!(record.last_error.as_deref(), Some("object not found"));
    }

    #[tokio::test]
    async fn test_repair_without_reported_attributes_stays_tainted() {
        let store = Arc::new(MemoryStateStore::new());
        let id = stored(&store, ReconciliationState::Tainted, profile("cg1")).await;
        let reconciler = reconciler(Scripted::new([ExecOutcome::Success(None)]), store.clone());

        let read = reconciler.repair(&id, &CancelSignal::none()).await.expect("repair");

        assert!(read.present);
        assert_eq!(read.state, ReconciliationState::Tainted);
        let record = store.load(&id).await.expect("load").expect("record");
        assert_eq!(record.state, ReconciliationState::Tainted);
        assert_eq!(
            record.last_error.as_deref(),
            Some("object exists but reported no attributes")
        );
    }

    #[tokio::test]
    async fn test_lease_outlives_slow_command() {
        let store = Arc::new(MemoryStateStore::new().with_lease_ttl(Duration::from_millis(150)));
        let id = stored(&store, ReconciliationState::Present, profile("cg1").with(STRATEGY, "SMALL")).await;
        let reconciler = reconciler(Arc::new(Slow(Duration::from_millis(500))), store.clone());
        let desired = profile("cg1").with(STRATEGY, "LARGE");

        let none = CancelSignal::none();
        let (result, contender) = tokio::join!(
            reconciler.update(&id, &desired, &none),
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                store.acquire_lock(&id, "someone-else").await
            }
        );

        result.expect("update");
        assert!(contender.is_err());
        assert!(store.get_lock_info(&id).await.expect("lock").is_none());
        assert_eq!(state_of(&store, &id).await, Some(ReconciliationState::Present));
    }
}
