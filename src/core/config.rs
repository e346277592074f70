//! Configuration types for the Rustine transaction coordinator
//!
//! Provides the per-`begin` transaction definition and the manager-level
//! options recognized by [`crate::manager::TransactionManager`].

use std::time::Duration;

/// How a requested transaction relates to one already in progress on the
/// same execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// Join the existing transaction; start a new one if none exists.
    Required,
    /// Always start a new transaction, suspending the existing one if present.
    RequiresNew,
    /// Create a savepoint on the existing transaction; start a new one if none exists.
    Nested,
    /// Join the existing transaction; otherwise run without a transaction.
    Supports,
    /// Suspend the existing transaction, if any, and run without one.
    NotSupported,
    /// Fail if a transaction exists; otherwise run without one.
    Never,
    /// Join the existing transaction; fail if none exists.
    Mandatory,
}

impl Default for Propagation {
    fn default() -> Self {
        Self::Required
    }
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Read uncommitted - lowest isolation, allows dirty reads
    ReadUncommitted,

    /// Read committed - default for most databases
    #[default]
    ReadCommitted,

    /// Repeatable read - prevents non-repeatable reads
    RepeatableRead,

    /// Serializable - highest isolation, prevents all anomalies
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL representation of this isolation level
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    /// A stricter-or-equal ordering used by `validateExistingTransaction`
    /// (ties are equal, not stricter).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::ReadUncommitted => 0,
            Self::ReadCommitted => 1,
            Self::RepeatableRead => 2,
            Self::Serializable => 3,
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// When [`crate::sync::Synchronization`] callbacks are activated for a
/// `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SynchronizationMode {
    /// Always activate synchronization, even for non-transactional execution.
    #[default]
    Always,
    /// Only activate synchronization when an actual physical transaction exists.
    OnActualTransaction,
    /// Never activate synchronization.
    Never,
}

/// Per-`begin` transaction definition.
#[derive(Debug, Clone)]
pub struct TransactionDefinition {
    /// Propagation behavior requested for this `begin`
    pub propagation: Propagation,
    /// Isolation level requested, if any (unset means "leave as-is")
    pub isolation: Option<IsolationLevel>,
    /// Whether this transaction should be read-only
    pub read_only: bool,
    /// Timeout for this transaction; falls back to
    /// [`ManagerOptions::default_timeout`] when unset
    pub timeout: Option<Duration>,
    /// A descriptive name, surfaced in logging and diagnostics
    pub name: Option<String>,
}

impl TransactionDefinition {
    /// Create a definition with [`Propagation::Required`] and all other
    /// fields at their defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a definition with the given propagation
    #[must_use]
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Request an isolation level
    #[must_use]
    pub const fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Mark the transaction read-only
    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set an explicit timeout, overriding the manager's default
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name the transaction (diagnostics only)
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self {
            propagation: Propagation::default(),
            isolation: None,
            read_only: false,
            timeout: None,
            name: None,
        }
    }
}

/// Manager-level configuration recognized by [`crate::manager::TransactionManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Controls when synchronization callbacks activate
    pub synchronization: SynchronizationMode,
    /// Timeout applied when a [`TransactionDefinition`] does not specify one
    pub default_timeout: Option<Duration>,
    /// Raise `UnexpectedRollbackError` at the inner boundary that set
    /// rollback-only, rather than waiting for the outer boundary
    pub fail_early_on_global_rollback_only: bool,
    /// Issue a rollback before surfacing a commit driver error
    pub rollback_on_commit_failure: bool,
    /// Emit `SET TRANSACTION READ ONLY` on begin of read-only transactions
    pub enforce_read_only: bool,
    /// Reject incompatible isolation/read-only when joining an existing transaction
    pub validate_existing_transaction: bool,
    /// Gates `NESTED` propagation behavior
    pub nested_transaction_allowed: bool,
}

impl ManagerOptions {
    /// Create manager options at their defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the synchronization activation mode
    #[must_use]
    pub const fn with_synchronization(mut self, mode: SynchronizationMode) -> Self {
        self.synchronization = mode;
        self
    }

    /// Set the default timeout applied when a definition omits one
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Toggle eager `UnexpectedRollbackError` at the inner boundary
    #[must_use]
    pub const fn with_fail_early_on_global_rollback_only(mut self, enabled: bool) -> Self {
        self.fail_early_on_global_rollback_only = enabled;
        self
    }

    /// Toggle rollback-before-surface on commit driver failure
    #[must_use]
    pub const fn with_rollback_on_commit_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_commit_failure = enabled;
        self
    }

    /// Toggle `SET TRANSACTION READ ONLY` enforcement
    #[must_use]
    pub const fn with_enforce_read_only(mut self, enabled: bool) -> Self {
        self.enforce_read_only = enabled;
        self
    }

    /// Toggle isolation/read-only validation when joining
    #[must_use]
    pub const fn with_validate_existing_transaction(mut self, enabled: bool) -> Self {
        self.validate_existing_transaction = enabled;
        self
    }

    /// Toggle whether `NESTED` propagation is permitted at all
    #[must_use]
    pub const fn with_nested_transaction_allowed(mut self, enabled: bool) -> Self {
        self.nested_transaction_allowed = enabled;
        self
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            synchronization: SynchronizationMode::default(),
            default_timeout: None,
            fail_early_on_global_rollback_only: false,
            rollback_on_commit_failure: false,
            enforce_read_only: false,
            validate_existing_transaction: false,
            nested_transaction_allowed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_defaults() {
        let def = TransactionDefinition::new();
        assert_eq!(def.propagation, Propagation::Required);
        assert!(!def.read_only);
        assert!(def.isolation.is_none());
    }

    #[test]
    fn test_definition_builder() {
        let def = TransactionDefinition::new()
            .with_propagation(Propagation::RequiresNew)
            .with_isolation(IsolationLevel::Serializable)
            .with_read_only(true)
            .with_name("transfer-funds");

        assert_eq!(def.propagation, Propagation::RequiresNew);
        assert_eq!(def.isolation, Some(IsolationLevel::Serializable));
        assert!(def.read_only);
        assert_eq!(def.name.as_deref(), Some("transfer-funds"));
    }

    #[test]
    fn test_manager_options_defaults() {
        let opts = ManagerOptions::default();
        assert_eq!(opts.synchronization, SynchronizationMode::Always);
        assert!(!opts.fail_early_on_global_rollback_only);
        assert!(opts.nested_transaction_allowed);
    }

    #[test]
    fn test_isolation_level_rank_strictness() {
        assert!(IsolationLevel::Serializable.rank() > IsolationLevel::ReadCommitted.rank());
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }
}
