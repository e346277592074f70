//! Transaction manager
//!
//! [`TransactionManager`] is the orchestrator every other component serves:
//! it turns a [`TransactionDefinition`] into a [`Transaction`] handle on
//! `begin`, and unwinds that handle correctly on `commit`/`rollback`,
//! including suspending and resuming whatever was in progress before it and
//! firing synchronization callbacks in the right order.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{ManagerOptions, Result, SynchronizationMode, TransactionDefinition, TransactionError};
use crate::driver::{ConnectionSource, ConnectionSourceId};
use crate::holder::ConnectionHolder;
use crate::propagation::{self, Decision};
use crate::registry;
use crate::sync::{self, CompletionStatus};
use crate::translate::{DefaultExceptionTranslator, ExceptionTranslator};
use crate::txn::{SuspendedResources, Transaction};

enum CommitOutcome {
    Committed,
    RolledBack,
}

/// Coordinates `begin`/`commit`/`rollback` against a single
/// [`ConnectionSource`] for the current execution context.
///
/// Cheap to construct per source; hold it behind an `Arc` (or simply clone
/// the inner `Arc<dyn ConnectionSource>` into several managers) if more than
/// one call site needs it, since it carries no connection state of its own
/// — all transactional state lives in the execution-context registry.
pub struct TransactionManager {
    source: Arc<dyn ConnectionSource>,
    source_id: ConnectionSourceId,
    options: ManagerOptions,
    translator: Arc<dyn ExceptionTranslator>,
}

impl TransactionManager {
    /// Build a manager over `source` with default options and the default
    /// SQLSTATE-class translator.
    #[must_use]
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self::with_options(source, ManagerOptions::default())
    }

    /// Build a manager over `source` with explicit options.
    #[must_use]
    pub fn with_options(source: Arc<dyn ConnectionSource>, options: ManagerOptions) -> Self {
        let source_id = ConnectionSourceId::of(&source);
        Self {
            source,
            source_id,
            options,
            translator: Arc::new(DefaultExceptionTranslator),
        }
    }

    /// Replace the default driver-error translator.
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn ExceptionTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// The manager's configured options.
    #[must_use]
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Open a transaction scope per `definition`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::IllegalTransactionState`] if propagation
    /// preconditions are violated (`NEVER` with an existing transaction,
    /// `MANDATORY` without one, or a `validate_existing_transaction`
    /// mismatch on join), [`TransactionError::NestedTransactionNotSupported`]
    /// if `NESTED` is requested but disallowed or unsupported by the driver,
    /// and [`TransactionError::CannotCreateTransaction`] if the driver fails
    /// during connection acquisition or setup.
    pub async fn begin(&self, definition: TransactionDefinition) -> Result<Transaction> {
        let existing_holder = registry::get_resource(self.source_id);
        let transaction_exists = existing_holder
            .as_ref()
            .is_some_and(|h| h.is_transaction_active());

        let decision = propagation::classify(definition.propagation, transaction_exists)?;
        debug!(?decision, propagation = ?definition.propagation, name = definition.name.as_deref(), "beginning transaction scope");

        match decision {
            Decision::Join => {
                let holder = existing_holder.expect("transaction_exists implies a bound holder");
                self.join(holder, &definition)
            }
            Decision::Begin => self.begin_new(&definition).await,
            Decision::SuspendAndBegin => {
                let suspended = self.suspend().await;
                match self.begin_new(&definition).await {
                    Ok(mut tx) => {
                        tx.suspended = Some(suspended);
                        Ok(tx)
                    }
                    Err(err) => {
                        self.resume(suspended).await;
                        Err(err)
                    }
                }
            }
            Decision::Savepoint => {
                let holder = existing_holder.expect("transaction_exists implies a bound holder");
                self.begin_savepoint(holder, &definition).await
            }
            Decision::RunWithoutTransaction => Ok(self.begin_without_transaction(&definition)),
            Decision::SuspendAndRunWithoutTransaction => {
                let suspended = self.suspend().await;
                let mut tx = self.begin_without_transaction(&definition);
                tx.suspended = Some(suspended);
                Ok(tx)
            }
        }
    }

    /// Commit a transaction scope.
    ///
    /// If `status` was marked rollback-only (locally, via
    /// [`Transaction::set_rollback_only`]) this rolls back instead and, for
    /// the outermost scope or a `NESTED` savepoint, returns
    /// [`TransactionError::UnexpectedRollback`] — the caller asked to
    /// commit and got a rollback.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::IllegalTransactionState`] if `status` was
    /// already completed, [`TransactionError::UnexpectedRollback`] per the
    /// rollback-only rules above, or a driver-surfaced
    /// [`TransactionError::TransactionSystem`]/`ConcurrencyFailure`.
    pub async fn commit(&self, status: Transaction) -> Result<()> {
        if status.is_completed() {
            return Err(TransactionError::IllegalTransactionState(
                "transaction status has already been completed".to_string(),
            )
            .into());
        }
        if status.is_local_rollback_only() {
            debug!("commit requested but transaction was marked rollback-only; rolling back");
            return self.process_rollback(status, false).await;
        }
        self.process_commit(status).await
    }

    /// Roll back a transaction scope.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::IllegalTransactionState`] if `status` was
    /// already completed, or a driver-surfaced
    /// [`TransactionError::TransactionSystem`].
    pub async fn rollback(&self, status: Transaction) -> Result<()> {
        if status.is_completed() {
            return Err(TransactionError::IllegalTransactionState(
                "transaction status has already been completed".to_string(),
            )
            .into());
        }
        self.process_rollback(status, true).await
    }

    fn join(&self, holder: Arc<ConnectionHolder>, definition: &TransactionDefinition) -> Result<Transaction> {
        if self.options.validate_existing_transaction {
            if let Some(wanted) = definition.isolation {
                if let Some(current) = registry::current_transaction_isolation() {
                    if wanted != current {
                        return Err(TransactionError::IllegalTransactionState(format!(
                            "participating transaction requested isolation {wanted} but the existing transaction runs at {current}"
                        ))
                        .into());
                    }
                }
            }
            if !definition.read_only && registry::is_current_transaction_read_only() {
                return Err(TransactionError::IllegalTransactionState(
                    "participating transaction requested read-write but the existing transaction is read-only".to_string(),
                )
                .into());
            }
        }

        holder.remaining_time()?;
        holder.retain();

        Ok(Transaction::new(
            Some(holder),
            false,
            false,
            false,
            definition.read_only,
            definition.name.clone(),
            definition.timeout,
        ))
    }

    async fn begin_new(&self, definition: &TransactionDefinition) -> Result<Transaction> {
        let connection = self
            .source
            .get_connection()
            .await
            .map_err(|e| TransactionError::CannotCreateTransaction {
                message: format!("failed to acquire a connection from '{}'", self.source.name()),
                source: Some(e),
            })?;
        let holder = Arc::new(ConnectionHolder::new(connection));

        let previous_auto_commit = holder
            .connection()
            .get_auto_commit()
            .await
            .map_err(|e| self.wrap_begin_error("get_auto_commit", e))?;
        holder.record_previous_auto_commit(previous_auto_commit);
        if previous_auto_commit {
            holder
                .connection()
                .set_auto_commit(false)
                .await
                .map_err(|e| self.wrap_begin_error("set_auto_commit", e))?;
        }

        if let Some(isolation) = definition.isolation {
            let previous = holder
                .connection()
                .get_transaction_isolation()
                .await
                .map_err(|e| self.wrap_begin_error("get_transaction_isolation", e))?;
            holder.record_previous_isolation(previous);
            if previous != isolation {
                holder
                    .connection()
                    .set_transaction_isolation(isolation)
                    .await
                    .map_err(|e| self.wrap_begin_error("set_transaction_isolation", e))?;
            }
        }

        if definition.read_only && self.options.enforce_read_only {
            holder
                .connection()
                .set_read_only(true)
                .await
                .map_err(|e| self.wrap_begin_error("set_read_only", e))?;
            holder.set_read_only_applied(true);
        }

        holder.set_transaction_active(true);

        let timeout = definition.timeout.or(self.options.default_timeout);
        if let Some(timeout) = timeout {
            holder.set_deadline(timeout);
        }

        holder.retain();
        registry::bind_resource(self.source_id, holder.clone());
        registry::set_actual_transaction_active(true);
        registry::set_current_transaction_read_only(definition.read_only);
        registry::set_current_transaction_isolation(definition.isolation);
        registry::set_current_transaction_name(definition.name.clone());

        let new_synchronization = self.activate_synchronization_if_needed(true);

        Ok(Transaction::new(
            Some(holder),
            true,
            true,
            new_synchronization,
            definition.read_only,
            definition.name.clone(),
            timeout,
        ))
    }

    async fn begin_savepoint(
        &self,
        holder: Arc<ConnectionHolder>,
        definition: &TransactionDefinition,
    ) -> Result<Transaction> {
        if !self.options.nested_transaction_allowed {
            return Err(TransactionError::NestedTransactionNotSupported(
                "nested transactions are disabled for this manager".to_string(),
            )
            .into());
        }
        if !holder.connection().supports_savepoints() {
            return Err(TransactionError::NestedTransactionNotSupported(
                "the underlying driver does not report savepoint support".to_string(),
            )
            .into());
        }
        holder.remaining_time()?;

        let name = holder.next_savepoint_name();
        holder
            .connection()
            .set_savepoint(&name)
            .await
            .map_err(|e| self.wrap_system_error("set_savepoint", e))?;
        holder.retain();

        let mut tx = Transaction::new(
            Some(holder),
            false,
            false,
            false,
            definition.read_only,
            definition.name.clone(),
            definition.timeout,
        );
        tx.savepoint = Some(crate::txn::Savepoint(name));
        Ok(tx)
    }

    fn begin_without_transaction(&self, definition: &TransactionDefinition) -> Transaction {
        let new_synchronization = self.activate_synchronization_if_needed(false);
        Transaction::new(
            None,
            false,
            false,
            new_synchronization,
            definition.read_only,
            definition.name.clone(),
            definition.timeout,
        )
    }

    fn activate_synchronization_if_needed(&self, actual_transaction: bool) -> bool {
        let should_activate = match self.options.synchronization {
            SynchronizationMode::Always => true,
            SynchronizationMode::OnActualTransaction => actual_transaction,
            SynchronizationMode::Never => false,
        };
        if should_activate && !registry::is_synchronization_active() {
            registry::init_synchronization();
            true
        } else {
            false
        }
    }

    async fn suspend(&self) -> SuspendedResources {
        let holder = registry::unbind_resource(self.source_id);
        let synchronizations = registry::take_synchronizations();
        if let Some(list) = &synchronizations {
            sync::suspend_all(list).await;
        }

        let transaction_name = registry::current_transaction_name();
        let transaction_read_only = registry::is_current_transaction_read_only();
        let transaction_isolation = registry::current_transaction_isolation();
        let actual_transaction_active = registry::is_actual_transaction_active();

        registry::set_current_transaction_name(None);
        registry::set_current_transaction_read_only(false);
        registry::set_current_transaction_isolation(None);
        registry::set_actual_transaction_active(false);

        debug!("suspended execution context resources");

        SuspendedResources {
            holder,
            synchronizations,
            transaction_name,
            transaction_read_only,
            transaction_isolation,
            actual_transaction_active,
        }
    }

    async fn resume(&self, suspended: SuspendedResources) {
        if let Some(holder) = suspended.holder {
            registry::bind_resource(self.source_id, holder);
        }
        if let Some(list) = &suspended.synchronizations {
            sync::resume_all(list).await;
        }
        registry::set_synchronizations(suspended.synchronizations);
        registry::set_current_transaction_name(suspended.transaction_name);
        registry::set_current_transaction_read_only(suspended.transaction_read_only);
        registry::set_current_transaction_isolation(suspended.transaction_isolation);
        registry::set_actual_transaction_active(suspended.actual_transaction_active);

        debug!("resumed execution context resources");
    }

    async fn process_commit(&self, mut status: Transaction) -> Result<()> {
        let outcome = self.do_commit(&status).await;
        let completion_status = match &outcome {
            Ok(CommitOutcome::Committed) => CompletionStatus::Committed,
            Ok(CommitOutcome::RolledBack) => CompletionStatus::RolledBack,
            Err(_) => CompletionStatus::Unknown,
        };

        self.finish(&status, completion_status).await;
        if let Some(suspended) = status.suspended.take() {
            self.resume(suspended).await;
        }
        status.mark_completed();

        match outcome {
            Ok(CommitOutcome::Committed) => Ok(()),
            Ok(CommitOutcome::RolledBack) => Err(TransactionError::UnexpectedRollback.into()),
            Err(err) => Err(err),
        }
    }

    async fn do_commit(&self, status: &Transaction) -> Result<CommitOutcome> {
        let Some(holder) = status.holder.as_ref() else {
            return Ok(CommitOutcome::Committed);
        };

        if let Some(savepoint) = &status.savepoint {
            if holder.is_rollback_only() {
                holder
                    .connection()
                    .rollback_to_savepoint(&savepoint.0)
                    .await
                    .map_err(|e| self.wrap_system_error("rollback_to_savepoint", e))?;
                holder
                    .connection()
                    .release_savepoint(&savepoint.0)
                    .await
                    .map_err(|e| self.wrap_system_error("release_savepoint", e))?;
                return Ok(CommitOutcome::RolledBack);
            }
            holder
                .connection()
                .release_savepoint(&savepoint.0)
                .await
                .map_err(|e| self.wrap_system_error("release_savepoint", e))?;
            return Ok(CommitOutcome::Committed);
        }

        if !status.is_new_transaction() {
            if holder.is_rollback_only() && self.options.fail_early_on_global_rollback_only {
                return Ok(CommitOutcome::RolledBack);
            }
            return Ok(CommitOutcome::Committed);
        }

        if status.new_synchronization {
            if let Some(list) = registry::peek_synchronizations() {
                sync::flush_all(&list).await;
                if let Err(err) = sync::invoke_before_commit(&list, status.is_read_only()).await {
                    sync::invoke_before_completion(&list).await;
                    if let Err(rollback_err) = holder.connection().rollback().await {
                        warn!(error = %rollback_err, "rollback after aborted before_commit also failed");
                    }
                    let err = match err {
                        crate::core::Error::Driver(driver_err) => {
                            self.translator.translate("before_commit", driver_err)
                        }
                        other => other,
                    };
                    return Err(err);
                }
                sync::invoke_before_completion(&list).await;
            }
        }

        if holder.is_rollback_only() {
            holder
                .connection()
                .rollback()
                .await
                .map_err(|e| self.wrap_system_error("rollback", e))?;
            return Ok(CommitOutcome::RolledBack);
        }

        match holder.connection().commit().await {
            Ok(()) => {
                if status.new_synchronization {
                    if let Some(list) = registry::peek_synchronizations() {
                        sync::invoke_after_commit(&list).await;
                    }
                }
                Ok(CommitOutcome::Committed)
            }
            Err(err) => {
                if self.options.rollback_on_commit_failure {
                    if let Err(rollback_err) = holder.connection().rollback().await {
                        warn!(error = %rollback_err, "rollback after failed commit also failed");
                    }
                    Ok(CommitOutcome::RolledBack)
                } else {
                    Err(self.wrap_system_error("commit", err))
                }
            }
        }
    }

    async fn process_rollback(&self, mut status: Transaction, explicit: bool) -> Result<()> {
        let was_new_transaction = status.is_new_transaction();
        let has_savepoint = status.savepoint.is_some();
        let fail_early =
            !was_new_transaction && !has_savepoint && self.options.fail_early_on_global_rollback_only;

        let result = self.do_rollback(&status).await;

        self.finish(&status, CompletionStatus::RolledBack).await;
        if let Some(suspended) = status.suspended.take() {
            self.resume(suspended).await;
        }
        status.mark_completed();

        result?;

        let surface_unexpected = !explicit && (was_new_transaction || has_savepoint || fail_early);
        if surface_unexpected {
            return Err(TransactionError::UnexpectedRollback.into());
        }
        Ok(())
    }

    async fn do_rollback(&self, status: &Transaction) -> Result<()> {
        if status.new_synchronization {
            if let Some(list) = registry::peek_synchronizations() {
                sync::invoke_before_completion(&list).await;
            }
        }

        let Some(holder) = status.holder.as_ref() else {
            return Ok(());
        };

        if let Some(savepoint) = &status.savepoint {
            holder
                .connection()
                .rollback_to_savepoint(&savepoint.0)
                .await
                .map_err(|e| self.wrap_system_error("rollback_to_savepoint", e))?;
            return holder
                .connection()
                .release_savepoint(&savepoint.0)
                .await
                .map_err(|e| self.wrap_system_error("release_savepoint", e));
        }

        if status.is_new_transaction() {
            return holder
                .connection()
                .rollback()
                .await
                .map_err(|e| self.wrap_system_error("rollback", e));
        }

        // Participating in a larger transaction: we cannot physically roll
        // back without affecting scopes above us, so escalate instead.
        holder.set_rollback_only();
        Ok(())
    }

    async fn finish(&self, status: &Transaction, completion_status: CompletionStatus) {
        if status.new_synchronization {
            if let Some(list) = registry::take_synchronizations() {
                sync::invoke_after_completion(&list, completion_status).await;
            }
            registry::set_current_transaction_name(None);
            registry::set_current_transaction_read_only(false);
            registry::set_current_transaction_isolation(None);
            registry::set_actual_transaction_active(false);
        }

        let Some(holder) = status.holder.as_ref() else {
            return;
        };
        let remaining = holder.release();

        if status.new_transaction {
            holder.set_transaction_active(false);
            holder.clear_rollback_only();
        }

        if status.new_holder {
            if let Some(previous) = holder.take_previous_auto_commit() {
                if previous {
                    if let Err(err) = holder.connection().set_auto_commit(true).await {
                        warn!(error = %err, "failed to restore auto-commit after transaction completion");
                    }
                }
            }
            if let Some(previous) = holder.take_previous_isolation() {
                if let Err(err) = holder.connection().set_transaction_isolation(previous).await {
                    warn!(error = %err, "failed to restore isolation level after transaction completion");
                }
            }
            if holder.read_only_applied() {
                if let Err(err) = holder.connection().set_read_only(false).await {
                    warn!(error = %err, "failed to clear read-only flag after transaction completion");
                }
                holder.set_read_only_applied(false);
            }

            registry::unbind_resource(self.source_id);
            if remaining == 0 {
                if let Err(err) = holder.connection().close().await {
                    warn!(error = %err, "failed to close connection after transaction completion");
                }
            }
        }
    }

    fn wrap_begin_error(&self, context: &str, err: crate::core::Error) -> crate::core::Error {
        match err {
            crate::core::Error::Driver(driver_err) => TransactionError::CannotCreateTransaction {
                message: format!("{context} failed while beginning a transaction"),
                source: Some(driver_err),
            }
            .into(),
            other => other,
        }
    }

    fn wrap_system_error(&self, context: &str, err: crate::core::Error) -> crate::core::Error {
        match err {
            crate::core::Error::Driver(driver_err) => self.translator.translate(context, driver_err),
            other => other,
        }
    }
}
