//! Execution-context resource registry
//!
//! Mirrors Spring's `TransactionSynchronizationManager`: a thread-local slate
//! of everything that makes "the current transaction" observable without
//! threading a context object through every call. Adapted from a
//! concurrent-map tenant-context pattern to a single `RefCell` since this
//! state is never shared across threads.
//!
//! A threaded async runtime pins an async task's poll to whichever worker
//! thread happens to run it next, so this is only correct as long as a
//! single logical "unit of work" does not hop threads between `begin` and
//! `commit`/`rollback` — the same constraint Spring's thread-local carries,
//! and the one this crate's `current_thread` test harness exists to satisfy.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::IsolationLevel;
use crate::driver::ConnectionSourceId;
use crate::holder::ConnectionHolder;
use crate::sync::Synchronization;

#[derive(Default)]
struct ExecutionContextState {
    resources: HashMap<ConnectionSourceId, Arc<ConnectionHolder>>,
    synchronizations: Option<Vec<Arc<dyn Synchronization>>>,
    transaction_name: Option<String>,
    transaction_read_only: bool,
    transaction_isolation: Option<IsolationLevel>,
    actual_transaction_active: bool,
}

thread_local! {
    static CONTEXT: RefCell<ExecutionContextState> = RefCell::new(ExecutionContextState::default());
}

/// Bind a connection holder to the current execution context under `id`.
///
/// # Panics
///
/// Panics if a holder is already bound for `id` — binding twice without an
/// intervening `unbind_resource` is a coordinator bug, not a recoverable
/// runtime condition (mirrors Spring's `IllegalStateException` on double
/// bind).
pub(crate) fn bind_resource(id: ConnectionSourceId, holder: Arc<ConnectionHolder>) {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        assert!(
            ctx.resources.insert(id, holder).is_none(),
            "a connection holder is already bound for this connection source"
        );
    });
}

/// Remove and return the holder bound for `id`, if any.
pub(crate) fn unbind_resource(id: ConnectionSourceId) -> Option<Arc<ConnectionHolder>> {
    CONTEXT.with(|ctx| ctx.borrow_mut().resources.remove(&id))
}

/// Look up the holder bound for `id`, if any.
pub(crate) fn get_resource(id: ConnectionSourceId) -> Option<Arc<ConnectionHolder>> {
    CONTEXT.with(|ctx| ctx.borrow().resources.get(&id).cloned())
}

/// Activate the synchronization callback list for the current context.
pub(crate) fn init_synchronization() {
    CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations = Some(Vec::new()));
}

/// Whether synchronization callbacks are currently active.
pub(crate) fn is_synchronization_active() -> bool {
    CONTEXT.with(|ctx| ctx.borrow().synchronizations.is_some())
}

/// Register a synchronization listener on the active list.
///
/// Returns `false` if synchronization is not active for the current context
/// (the caller translates that into [`crate::core::TransactionError::IllegalState`]
/// only when registration happens mid-`afterCompletion`; outside that window
/// it is simply a caller error to register without an active transaction).
pub(crate) fn register_synchronization(sync: Arc<dyn Synchronization>) -> bool {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        match ctx.synchronizations.as_mut() {
            Some(list) => {
                list.push(sync);
                true
            }
            None => false,
        }
    })
}

/// Take (and clear) the full synchronization list, used both by `suspend`
/// and by completion once callbacks have all fired.
pub(crate) fn take_synchronizations() -> Option<Vec<Arc<dyn Synchronization>>> {
    CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations.take())
}

/// Snapshot the synchronization list without clearing it.
pub(crate) fn peek_synchronizations() -> Option<Vec<Arc<dyn Synchronization>>> {
    CONTEXT.with(|ctx| ctx.borrow().synchronizations.clone())
}

/// Replace the synchronization list wholesale (used by `resume`).
pub(crate) fn set_synchronizations(value: Option<Vec<Arc<dyn Synchronization>>>) {
    CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations = value);
}

/// Name of the transaction currently bound to the execution context.
pub(crate) fn current_transaction_name() -> Option<String> {
    CONTEXT.with(|ctx| ctx.borrow().transaction_name.clone())
}

pub(crate) fn set_current_transaction_name(name: Option<String>) {
    CONTEXT.with(|ctx| ctx.borrow_mut().transaction_name = name);
}

pub(crate) fn is_current_transaction_read_only() -> bool {
    CONTEXT.with(|ctx| ctx.borrow().transaction_read_only)
}

pub(crate) fn set_current_transaction_read_only(read_only: bool) {
    CONTEXT.with(|ctx| ctx.borrow_mut().transaction_read_only = read_only);
}

pub(crate) fn current_transaction_isolation() -> Option<IsolationLevel> {
    CONTEXT.with(|ctx| ctx.borrow().transaction_isolation)
}

pub(crate) fn set_current_transaction_isolation(isolation: Option<IsolationLevel>) {
    CONTEXT.with(|ctx| ctx.borrow_mut().transaction_isolation = isolation);
}

/// Whether an actual physical transaction (as opposed to a non-transactional
/// `SUPPORTS`/`NOT_SUPPORTED` scope) is active for the current context.
pub(crate) fn is_actual_transaction_active() -> bool {
    CONTEXT.with(|ctx| ctx.borrow().actual_transaction_active)
}

pub(crate) fn set_actual_transaction_active(active: bool) {
    CONTEXT.with(|ctx| ctx.borrow_mut().actual_transaction_active = active);
}

#[cfg(test)]
pub(crate) fn clear_for_test() {
    CONTEXT.with(|ctx| *ctx.borrow_mut() = ExecutionContextState::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::FakeSource;
    use crate::driver::ConnectionSource;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_bind_and_unbind_roundtrip() {
        clear_for_test();
        let source: Arc<dyn ConnectionSource> = Arc::new(FakeSource::new(true));
        let id = ConnectionSourceId::of(&source);
        let conn = source.get_connection().await.unwrap();
        let holder = Arc::new(ConnectionHolder::new(conn));

        assert!(get_resource(id).is_none());
        bind_resource(id, holder);
        assert!(get_resource(id).is_some());
        assert!(unbind_resource(id).is_some());
        assert!(get_resource(id).is_none());
    }

    #[test]
    fn test_synchronization_lifecycle() {
        clear_for_test();
        assert!(!is_synchronization_active());
        init_synchronization();
        assert!(is_synchronization_active());
        let list = take_synchronizations();
        assert!(list.is_some());
        assert!(!is_synchronization_active());
    }

    #[test]
    fn test_current_transaction_name_roundtrip() {
        clear_for_test();
        assert!(current_transaction_name().is_none());
        set_current_transaction_name(Some("transfer-funds".to_string()));
        assert_eq!(current_transaction_name().as_deref(), Some("transfer-funds"));
        set_current_transaction_name(None);
        assert!(current_transaction_name().is_none());
    }
}
