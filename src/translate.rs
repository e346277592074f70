//! Driver-error translation hook
//!
//! Translating vendor SQLSTATE codes into a full domain taxonomy is out of
//! scope: this module only defines the seam a caller with a real driver can
//! plug a proper translator into, plus a
//! conservative default that classifies on the thin `sqlstate_class` a
//! [`DriverError`] may carry.

use crate::core::{DriverError, Error, TransactionError};

/// Translates a driver error surfaced during commit/rollback/savepoint work
/// into a coordinator [`Error`].
///
/// [`crate::manager::TransactionManager`] calls this only for errors raised
/// by [`crate::driver::PhysicalConnection`] once a transaction is already in
/// progress; connection-acquisition failures at `begin` are always
/// [`TransactionError::CannotCreateTransaction`] regardless of translator.
pub trait ExceptionTranslator: Send + Sync {
    /// Translate `error`, encountered while performing `context` (e.g.
    /// `"commit"`, `"rollback_to_savepoint"`), into a coordinator error.
    fn translate(&self, context: &str, error: DriverError) -> Error;
}

/// The translator a [`crate::manager::TransactionManager`] uses unless one
/// is supplied explicitly.
///
/// Classifies SQLSTATE class `"40"` (transaction rollback, covering
/// serialization failures and deadlock victims under most drivers) as
/// [`TransactionError::ConcurrencyFailure`] so callers can distinguish a
/// retryable conflict from a hard failure; everything else becomes
/// [`TransactionError::TransactionSystem`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionTranslator;

impl ExceptionTranslator for DefaultExceptionTranslator {
    fn translate(&self, context: &str, error: DriverError) -> Error {
        let message = format!("{context}: {error}");
        match error.sqlstate_class.as_deref() {
            Some("40") => TransactionError::ConcurrencyFailure {
                message,
                source: Some(error),
            }
            .into(),
            _ => TransactionError::TransactionSystem {
                message,
                source: Some(error),
            }
            .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_class_is_concurrency_failure() {
        let translator = DefaultExceptionTranslator;
        let error = DriverError::message("could not serialize access").with_sqlstate_class("40");
        let translated = translator.translate("commit", error);
        assert!(translated.is_retryable());
    }

    #[test]
    fn test_unknown_class_is_transaction_system_error() {
        let translator = DefaultExceptionTranslator;
        let error = DriverError::message("connection reset");
        let translated = translator.translate("commit", error);
        assert!(matches!(
            translated,
            Error::Transaction(TransactionError::TransactionSystem { .. })
        ));
    }
}
