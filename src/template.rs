//! Callback-style transaction execution
//!
//! [`TransactionTemplate`] is the ergonomic wrapper around
//! `begin`/`commit`/`rollback`: it runs a callback inside a transaction
//! scope, committing on success and rolling back on failure, so callers
//! never have to remember to balance `begin` with exactly one of
//! `commit`/`rollback` themselves.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::core::{Result, TransactionDefinition};
use crate::manager::TransactionManager;
use crate::txn::Transaction;

/// Runs a callback inside a transaction scope opened against a
/// [`TransactionManager`] with a fixed [`TransactionDefinition`].
pub struct TransactionTemplate {
    manager: Arc<TransactionManager>,
    definition: TransactionDefinition,
}

impl TransactionTemplate {
    /// Build a template using [`TransactionDefinition::default`].
    #[must_use]
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self::with_definition(manager, TransactionDefinition::new())
    }

    /// Build a template that opens every scope with `definition`.
    #[must_use]
    pub fn with_definition(manager: Arc<TransactionManager>, definition: TransactionDefinition) -> Self {
        Self { manager, definition }
    }

    /// Run `callback` inside a transaction scope.
    ///
    /// On `Ok`, the scope is committed (which still rolls back and returns
    /// [`crate::core::TransactionError::UnexpectedRollback`] if `callback`
    /// called [`Transaction::set_rollback_only`] without itself failing).
    /// On `Err`, the scope is rolled back and the callback's error is
    /// returned; a failure during that rollback is logged, not propagated,
    /// so the caller always sees the business error that caused it.
    ///
    /// # Errors
    ///
    /// Propagates whatever `begin` or `callback` returned, or
    /// [`crate::core::TransactionError::UnexpectedRollback`] from `commit`.
    pub async fn execute<F, Fut, T>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let status = self.manager.begin(self.definition.clone()).await?;

        match callback(&status).await {
            Ok(value) => self.manager.commit(status).await.map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = self.manager.rollback(status).await {
                    warn!(
                        error = %rollback_err,
                        original_error = %err,
                        "rollback after callback failure also failed; surfacing the original error"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, ManagerOptions, TransactionError};
    use crate::driver::test_support::FakeSource;
    use crate::registry;

    fn template(source: Arc<FakeSource>) -> TransactionTemplate {
        registry::clear_for_test();
        TransactionTemplate::new(Arc::new(TransactionManager::new(source)))
    }

    #[tokio::test]
    async fn test_successful_callback_commits() {
        let source = Arc::new(FakeSource::new(true));
        let log = source.log.clone();
        let tmpl = template(source);

        let result: Result<i32> = tmpl.execute(|_status| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(log.events().iter().any(|e| e.ends_with(".commit")));
    }

    #[tokio::test]
    async fn test_failing_callback_rolls_back() {
        let source = Arc::new(FakeSource::new(true));
        let log = source.log.clone();
        let tmpl = template(source);

        let result: Result<()> = tmpl
            .execute(|_status| async {
                Err(Error::Transaction(TransactionError::IllegalState))
            })
            .await;

        assert!(result.is_err());
        assert!(log.events().iter().any(|e| e.ends_with(".rollback")));
        assert!(!log.events().iter().any(|e| e.ends_with(".commit")));
    }

    #[tokio::test]
    async fn test_callback_marking_rollback_only_is_honored_on_success() {
        let source = Arc::new(FakeSource::new(true));
        let log = source.log.clone();
        let tmpl = template(source);

        let result: Result<()> = tmpl
            .execute(|status| async move {
                status.set_rollback_only();
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_unexpected_rollback());
        assert!(log.events().iter().any(|e| e.ends_with(".rollback")));
    }

    #[tokio::test]
    async fn test_template_with_explicit_options() {
        let source = Arc::new(FakeSource::new(true));
        registry::clear_for_test();
        let manager = Arc::new(TransactionManager::with_options(
            source,
            ManagerOptions::new().with_default_timeout(std::time::Duration::from_secs(30)),
        ));
        let tmpl = TransactionTemplate::new(manager);

        let result: Result<i32> = tmpl.execute(|_status| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
