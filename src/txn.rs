//! Transaction status handle
//!
//! [`Transaction`] is what [`crate::manager::TransactionManager::begin`]
//! hands back. It carries everything `commit`/`rollback` need to unwind
//! correctly: whether this call actually started a new physical
//! transaction, whether it owns the connection holder outright, any
//! savepoint it created for `NESTED` participation, and whatever was
//! suspended to make room for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::IsolationLevel;
use crate::holder::ConnectionHolder;
use crate::sync::Synchronization;

/// An opaque savepoint handle created for `NESTED` propagation.
///
/// The wrapped name is only ever read by
/// [`crate::driver::PhysicalConnection::release_savepoint`] and
/// [`crate::driver::PhysicalConnection::rollback_to_savepoint`]; callers
/// never need to inspect it.
#[derive(Debug, Clone)]
pub struct Savepoint(pub(crate) String);

/// Everything unbound from the execution context to make room for a
/// suspended outer transaction, kept until the inner transaction this
/// manager started completes and the outer is resumed.
pub(crate) struct SuspendedResources {
    pub(crate) holder: Option<Arc<ConnectionHolder>>,
    pub(crate) synchronizations: Option<Vec<Arc<dyn Synchronization>>>,
    pub(crate) transaction_name: Option<String>,
    pub(crate) transaction_read_only: bool,
    pub(crate) transaction_isolation: Option<IsolationLevel>,
    pub(crate) actual_transaction_active: bool,
}

/// A handle to one `begin`/`commit`-or-`rollback` span.
pub struct Transaction {
    pub(crate) holder: Option<Arc<ConnectionHolder>>,
    /// This call acquired the physical connection and drove it through
    /// `begin` (as opposed to joining one already bound).
    pub(crate) new_holder: bool,
    /// This call started an actual new physical transaction (false for a
    /// non-transactional `SUPPORTS`/`NOT_SUPPORTED` scope, or for a plain
    /// join).
    pub(crate) new_transaction: bool,
    /// This call activated synchronization for the execution context (and
    /// so must deactivate it on completion).
    pub(crate) new_synchronization: bool,
    pub(crate) savepoint: Option<Savepoint>,
    pub(crate) suspended: Option<SuspendedResources>,
    pub(crate) read_only: bool,
    pub(crate) name: Option<String>,
    pub(crate) timeout: Option<Duration>,
    local_rollback_only: AtomicBool,
    completed: AtomicBool,
}

impl Transaction {
    pub(crate) fn new(
        holder: Option<Arc<ConnectionHolder>>,
        new_holder: bool,
        new_transaction: bool,
        new_synchronization: bool,
        read_only: bool,
        name: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            holder,
            new_holder,
            new_transaction,
            new_synchronization,
            savepoint: None,
            suspended: None,
            read_only,
            name,
            timeout,
            local_rollback_only: AtomicBool::new(false),
            completed: AtomicBool::new(false),
        }
    }

    /// Whether this call actually started a brand new physical transaction.
    ///
    /// `false` for a scope that joined an outer transaction, for a plain
    /// `SUPPORTS`/`NOT_SUPPORTED` scope running without one, and for a
    /// `NESTED` savepoint scope (the savepoint participates in the
    /// surrounding physical transaction, it does not start one).
    #[must_use]
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Whether a savepoint backs this scope (`NESTED` propagation joining
    /// an existing transaction).
    #[must_use]
    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    /// Whether this scope is running without any physical transaction
    /// (`SUPPORTS`/`NOT_SUPPORTED` with nothing to join).
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.holder.is_some()
    }

    /// Mark this scope rollback-only. Idempotent.
    pub fn set_rollback_only(&self) {
        self.local_rollback_only.store(true, Ordering::SeqCst);
    }

    /// Whether this scope has been marked rollback-only, locally or via
    /// escalation onto the shared holder.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        if self.local_rollback_only.load(Ordering::SeqCst) {
            return true;
        }
        self.holder
            .as_ref()
            .is_some_and(|h| h.is_rollback_only())
    }

    pub(crate) fn is_local_rollback_only(&self) -> bool {
        self.local_rollback_only.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    /// Whether `commit`/`rollback` has already consumed this status.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// The transaction's name, if one was given at `begin` (diagnostics only).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this scope was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("new_transaction", &self.new_transaction)
            .field("has_savepoint", &self.has_savepoint())
            .field("is_transactional", &self.is_transactional())
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_transactional() && !self.is_completed() {
            tracing::warn!(
                name = self.name.as_deref().unwrap_or(""),
                "transaction status dropped without calling commit or rollback; \
                 connection resources may remain bound to the execution context"
            );
        }
    }
}
