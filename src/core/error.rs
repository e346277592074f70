//! Error types for the Rustine transaction coordinator
//!
//! Provides a structured error hierarchy covering the coordinator's
//! responsibilities: connection acquisition, propagation preconditions,
//! commit/rollback outcomes, and driver-error translation.

use std::fmt;

use thiserror::Error;

/// Result type alias using the crate [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all transaction-coordinator operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transaction-related errors (propagation, commit, rollback, timeout)
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Driver-level errors surfaced while acquiring or configuring a connection
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration errors (invalid manager options or transaction definition)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Transaction-coordinator error taxonomy
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Driver failed during `begin` (connection acquisition, initial
    /// `getAutoCommit`, isolation set).
    #[error("Cannot create transaction: {message}")]
    CannotCreateTransaction {
        /// Description of what failed
        message: String,
        /// Underlying driver error, if any
        #[source]
        source: Option<DriverError>,
    },

    /// Driver failed during commit or rollback and no specific translation applies.
    #[error("Transaction system error: {message}")]
    TransactionSystem {
        /// Description of what failed
        message: String,
        /// Underlying driver error
        #[source]
        source: Option<DriverError>,
    },

    /// Commit was requested but rollback-only was set, either by the inner
    /// scope or by a participant that escalated to the holder.
    #[error("Transaction rolled back because it was marked rollback-only")]
    UnexpectedRollback,

    /// Propagation preconditions were violated: `NEVER` with an existing
    /// transaction, `MANDATORY` without one, or a `validateExistingTransaction`
    /// mismatch on join.
    #[error("Illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// `NESTED` was requested but the driver lacks savepoint support, or the
    /// manager is not configured to allow nested transactions.
    #[error("Nested transactions are not supported: {0}")]
    NestedTransactionNotSupported(String),

    /// The transaction's deadline elapsed before the guarded operation ran.
    #[error("Transaction timed out")]
    TimedOut,

    /// A concurrency failure translated from a driver error (e.g. a
    /// serialization conflict reported by the driver's SQLSTATE class).
    #[error("Concurrency failure: {message}")]
    ConcurrencyFailure {
        /// Description of the conflict
        message: String,
        /// Underlying driver error
        #[source]
        source: Option<DriverError>,
    },

    /// A synchronization listener was registered while `afterCompletion` was
    /// running for the current transaction. The listener attempting
    /// registration observes this.
    #[error("Cannot register a synchronization while completion is in progress")]
    IllegalState,
}

/// An error surfaced by the underlying driver/connection, carrying enough
/// context for the translator hook to classify it.
///
/// This is intentionally thin: translating vendor SQLSTATE codes into a
/// full domain taxonomy is out of scope — the coordinator only defines the
/// shape the translator consumes and a conservative default.
#[derive(Debug)]
pub struct DriverError {
    /// Human-readable message from the driver
    pub message: String,
    /// SQLSTATE-like class, when the driver exposes one (e.g. `"40"` for
    /// serialization failures)
    pub sqlstate_class: Option<String>,
    /// The underlying error, if the driver implementation preserved one
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    /// Build a driver error from a plain message
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sqlstate_class: None,
            source: None,
        }
    }

    /// Build a driver error carrying a SQLSTATE class
    #[must_use]
    pub fn with_sqlstate_class(mut self, class: impl Into<String>) -> Self {
        self.sqlstate_class = Some(class.into());
        self
    }

    /// Attach an underlying error source
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is an unexpected-rollback outcome
    #[must_use]
    pub const fn is_unexpected_rollback(&self) -> bool {
        matches!(
            self,
            Self::Transaction(TransactionError::UnexpectedRollback)
        )
    }

    /// Check if this error indicates the operation can be retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transaction(
                TransactionError::ConcurrencyFailure { .. } | TransactionError::TimedOut
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Transaction(TransactionError::UnexpectedRollback);
        assert_eq!(
            err.to_string(),
            "Transaction error: Transaction rolled back because it was marked rollback-only"
        );
    }

    #[test]
    fn test_unexpected_rollback_detection() {
        let err = Error::Transaction(TransactionError::UnexpectedRollback);
        assert!(err.is_unexpected_rollback());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_concurrency_failure_is_retryable() {
        let err = Error::Transaction(TransactionError::ConcurrencyFailure {
            message: "serialization failure".to_string(),
            source: None,
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_driver_error_source_chain() {
        let driver_err = DriverError::message("deadlock detected").with_sqlstate_class("40");
        assert_eq!(driver_err.sqlstate_class.as_deref(), Some("40"));
    }
}
