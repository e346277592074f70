//! Propagation decision table
//!
//! [`classify`] is the pure dispatcher at the heart of `begin`: given the
//! requested propagation and whether a transaction already exists on the
//! execution context, it decides the *shape* of the scope to open. Nothing
//! here touches a connection, the registry, or synchronization — that keeps
//! it exhaustively unit-testable (the nine rows of this table are the
//! clearest testable property this crate has).

use crate::core::{Propagation, TransactionError};

/// What [`crate::manager::TransactionManager::begin`] should do, derived
/// purely from the requested propagation and whether a transaction is
/// already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Join the transaction already in progress.
    Join,
    /// Suspend the transaction already in progress and start a new one.
    SuspendAndBegin,
    /// Create a savepoint on the transaction already in progress.
    Savepoint,
    /// Start a new transaction; nothing to suspend.
    Begin,
    /// Run without a transaction; nothing was in progress to suspend.
    RunWithoutTransaction,
    /// Suspend the transaction already in progress and run without one.
    SuspendAndRunWithoutTransaction,
}

/// Classify a propagation request against whether a transaction currently
/// exists, following the same decision tree as Spring's
/// `AbstractPlatformTransactionManager.getTransaction`.
///
/// # Errors
///
/// Returns [`TransactionError::IllegalTransactionState`] for `NEVER` with an
/// existing transaction or `MANDATORY` without one — the two propagation
/// modes that can reject a `begin` outright before any connection work
/// happens.
pub fn classify(
    propagation: Propagation,
    transaction_exists: bool,
) -> Result<Decision, TransactionError> {
    use Propagation::{Mandatory, Nested, Never, NotSupported, Required, RequiresNew, Supports};

    Ok(match (propagation, transaction_exists) {
        (Required | Mandatory, true) => Decision::Join,
        (Required, false) => Decision::Begin,
        (RequiresNew, true) => Decision::SuspendAndBegin,
        (RequiresNew, false) => Decision::Begin,
        (Nested, true) => Decision::Savepoint,
        (Nested, false) => Decision::Begin,
        (Supports, true) => Decision::Join,
        (Supports, false) => Decision::RunWithoutTransaction,
        (NotSupported, true) => Decision::SuspendAndRunWithoutTransaction,
        (NotSupported, false) => Decision::RunWithoutTransaction,
        (Never, true) => {
            return Err(TransactionError::IllegalTransactionState(
                "existing transaction found for propagation NEVER".to_string(),
            ))
        }
        (Never, false) => Decision::RunWithoutTransaction,
        (Mandatory, false) => {
            return Err(TransactionError::IllegalTransactionState(
                "no existing transaction found for propagation MANDATORY".to_string(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use Propagation::{Mandatory, Nested, Never, NotSupported, Required, RequiresNew, Supports};

    #[test]
    fn test_required_joins_or_begins() {
        assert_eq!(classify(Required, true).unwrap(), Decision::Join);
        assert_eq!(classify(Required, false).unwrap(), Decision::Begin);
    }

    #[test]
    fn test_requires_new_always_begins() {
        assert_eq!(classify(RequiresNew, true).unwrap(), Decision::SuspendAndBegin);
        assert_eq!(classify(RequiresNew, false).unwrap(), Decision::Begin);
    }

    #[test]
    fn test_nested_creates_savepoint_only_when_existing() {
        assert_eq!(classify(Nested, true).unwrap(), Decision::Savepoint);
        assert_eq!(classify(Nested, false).unwrap(), Decision::Begin);
    }

    #[test]
    fn test_supports_joins_or_runs_bare() {
        assert_eq!(classify(Supports, true).unwrap(), Decision::Join);
        assert_eq!(
            classify(Supports, false).unwrap(),
            Decision::RunWithoutTransaction
        );
    }

    #[test]
    fn test_not_supported_suspends_or_runs_bare() {
        assert_eq!(
            classify(NotSupported, true).unwrap(),
            Decision::SuspendAndRunWithoutTransaction
        );
        assert_eq!(
            classify(NotSupported, false).unwrap(),
            Decision::RunWithoutTransaction
        );
    }

    #[test]
    fn test_never_rejects_existing_and_runs_bare_otherwise() {
        assert!(classify(Never, true).is_err());
        assert_eq!(
            classify(Never, false).unwrap(),
            Decision::RunWithoutTransaction
        );
    }

    #[test]
    fn test_mandatory_joins_or_rejects() {
        assert_eq!(classify(Mandatory, true).unwrap(), Decision::Join);
        assert!(classify(Mandatory, false).is_err());
    }
}
