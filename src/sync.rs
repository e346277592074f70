//! Synchronization listener protocol
//!
//! A [`Synchronization`] observes the lifecycle of the transaction it was
//! registered against. Most callbacks are pure reactions that cannot affect
//! the outcome, but `before_commit` is the one exception: a listener that
//! fails there aborts the remaining `before_commit` calls and the commit
//! itself, sending the transaction down the rollback path instead.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Result, TransactionError};
use crate::registry;

/// How a transaction finished, passed to [`Synchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
    /// The transaction's outcome could not be determined (e.g. a driver
    /// error during commit with `rollback_on_commit_failure` disabled).
    Unknown,
}

/// A listener bound to the execution context for the lifetime of one logical
/// transaction.
///
/// All methods default to no-ops so implementors only override what they
/// need.
#[async_trait]
pub trait Synchronization: Send + Sync {
    /// Called when the owning transaction is suspended.
    async fn suspend(&self) {}

    /// Called when the owning transaction is resumed after a suspension.
    async fn resume(&self) {}

    /// Called before commit to flush any buffered writes the listener holds
    /// (e.g. a session cache) so they're visible to the physical commit.
    async fn flush(&self) {}

    /// Called before the physical commit, only for an actual new
    /// transaction. Returning an error aborts the remaining `before_commit`
    /// calls and the commit itself: the manager rolls back instead and
    /// surfaces this error (translated if driver-originated) to the caller.
    async fn before_commit(&self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Called before transaction completion, regardless of outcome, while
    /// the resources are still bound.
    async fn before_completion(&self) {}

    /// Called after a successful commit, only for an actual new transaction.
    async fn after_commit(&self) {}

    /// Called after the transaction completes, in reverse registration
    /// order, once resources are unbound.
    async fn after_completion(&self, _status: CompletionStatus) {}
}

/// Register `sync` against whatever transaction is current on the calling
/// execution context.
///
/// # Errors
///
/// Returns [`TransactionError::IllegalState`] if no transaction is active
/// for the current context, or if called while that transaction's
/// `after_completion` callbacks are in progress (synchronization has
/// already been taken for dispatch by that point).
pub fn register_synchronization(sync: Arc<dyn Synchronization>) -> Result<()> {
    if registry::register_synchronization(sync) {
        Ok(())
    } else {
        Err(TransactionError::IllegalState.into())
    }
}

pub(crate) async fn suspend_all(synchronizations: &[Arc<dyn Synchronization>]) {
    for sync in synchronizations {
        sync.suspend().await;
    }
}

pub(crate) async fn resume_all(synchronizations: &[Arc<dyn Synchronization>]) {
    for sync in synchronizations {
        sync.resume().await;
    }
}

pub(crate) async fn flush_all(synchronizations: &[Arc<dyn Synchronization>]) {
    for sync in synchronizations {
        sync.flush().await;
    }
}

/// Invoke `before_commit` on every listener in registration order, stopping
/// at the first error (the remaining listeners are never called; the
/// manager aborts the commit and rolls back instead).
pub(crate) async fn invoke_before_commit(
    synchronizations: &[Arc<dyn Synchronization>],
    read_only: bool,
) -> Result<()> {
    for sync in synchronizations {
        sync.before_commit(read_only).await?;
    }
    Ok(())
}

pub(crate) async fn invoke_before_completion(synchronizations: &[Arc<dyn Synchronization>]) {
    for sync in synchronizations {
        sync.before_completion().await;
    }
}

pub(crate) async fn invoke_after_commit(synchronizations: &[Arc<dyn Synchronization>]) {
    for sync in synchronizations {
        sync.after_commit().await;
    }
}

/// Invoked in reverse registration order.
pub(crate) async fn invoke_after_completion(
    synchronizations: &[Arc<dyn Synchronization>],
    status: CompletionStatus,
) {
    for sync in synchronizations.iter().rev() {
        sync.after_completion(status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_synchronization_requires_active_context() {
        registry::clear_for_test();
        let sync: Arc<dyn Synchronization> = Arc::new(RecordingSync {
            order: Arc::new(std::sync::Mutex::new(Vec::new())),
            label: "x",
        });
        assert!(matches!(
            register_synchronization(sync).unwrap_err(),
            crate::core::Error::Transaction(TransactionError::IllegalState)
        ));
    }

    #[test]
    fn test_register_synchronization_succeeds_when_active() {
        registry::clear_for_test();
        registry::init_synchronization();
        let sync: Arc<dyn Synchronization> = Arc::new(RecordingSync {
            order: Arc::new(std::sync::Mutex::new(Vec::new())),
            label: "x",
        });
        assert!(register_synchronization(sync).is_ok());
        assert_eq!(registry::take_synchronizations().unwrap().len(), 1);
    }

    struct RecordingSync {
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    #[async_trait]
    impl Synchronization for RecordingSync {
        async fn before_completion(&self) {
            self.order
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(self.label);
        }

        async fn after_completion(&self, _status: CompletionStatus) {
            self.order
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(self.label);
        }
    }

    #[tokio::test]
    async fn test_after_completion_runs_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let syncs: Vec<Arc<dyn Synchronization>> = vec![
            Arc::new(RecordingSync {
                order: order.clone(),
                label: "first",
            }),
            Arc::new(RecordingSync {
                order: order.clone(),
                label: "second",
            }),
        ];

        invoke_after_completion(&syncs, CompletionStatus::Committed).await;

        let recorded = order.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(recorded, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_before_completion_runs_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let syncs: Vec<Arc<dyn Synchronization>> = vec![
            Arc::new(RecordingSync {
                order: order.clone(),
                label: "first",
            }),
            Arc::new(RecordingSync {
                order: order.clone(),
                label: "second",
            }),
        ];

        invoke_before_completion(&syncs).await;

        let recorded = order.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(recorded, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_before_commit_error_aborts_remaining_listeners() {
        struct CountingSync {
            calls: AtomicUsize,
            fails: bool,
        }

        #[async_trait]
        impl Synchronization for CountingSync {
            async fn before_commit(&self, _read_only: bool) -> Result<()> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fails {
                    return Err(crate::core::TransactionError::IllegalState.into());
                }
                Ok(())
            }
        }

        let failing = Arc::new(CountingSync {
            calls: AtomicUsize::new(0),
            fails: true,
        });
        let never_reached = Arc::new(CountingSync {
            calls: AtomicUsize::new(0),
            fails: false,
        });
        let syncs: Vec<Arc<dyn Synchronization>> = vec![failing.clone(), never_reached.clone()];

        let result = invoke_before_commit(&syncs, false).await;
        assert!(result.is_err());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never_reached.calls.load(Ordering::SeqCst), 0);
    }
}
