//! Connection holder
//!
//! Wraps a single physical connection with a reference count, a
//! rollback-only flag, an optional deadline, and a savepoint counter. The
//! holder is the only thing the execution-context registry and a
//! [`crate::txn::SuspendedResources`] snapshot ever own exclusively.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::{IsolationLevel, Result, TransactionError};
use crate::driver::PhysicalConnection;

/// Per-source owner of a physical connection plus its transactional state
/// flags.
///
/// Holder invariants: `reference_count == 0` implies the holder is not
/// bound into the registry; `transaction_active == true` implies exactly
/// one outstanding `begin`; `savepoint_counter` never decreases; a
/// rolled-back holder is never committed (enforced by the manager, not the
/// holder itself — the holder only tracks state, it does not decide).
pub struct ConnectionHolder {
    connection: Box<dyn PhysicalConnection>,
    reference_count: AtomicU32,
    transaction_active: AtomicBool,
    rollback_only: AtomicBool,
    savepoint_counter: AtomicU32,
    deadline: Mutex<Option<Instant>>,
    synchronized_with_transaction: AtomicBool,
    /// auto-commit value observed before the manager touched it, so cleanup
    /// can restore it verbatim.
    previous_auto_commit: Mutex<Option<bool>>,
    /// isolation value observed before the manager touched it.
    previous_isolation: Mutex<Option<IsolationLevel>>,
    /// whether the manager itself turned read-only on (and must turn it off).
    read_only_applied: AtomicBool,
}

impl ConnectionHolder {
    /// Wrap a freshly acquired physical connection. The holder starts
    /// unbound (`reference_count == 0`); the manager increments it when
    /// binding into the registry.
    #[must_use]
    pub fn new(connection: Box<dyn PhysicalConnection>) -> Self {
        Self {
            connection,
            reference_count: AtomicU32::new(0),
            transaction_active: AtomicBool::new(false),
            rollback_only: AtomicBool::new(false),
            savepoint_counter: AtomicU32::new(0),
            deadline: Mutex::new(None),
            synchronized_with_transaction: AtomicBool::new(false),
            previous_auto_commit: Mutex::new(None),
            previous_isolation: Mutex::new(None),
            read_only_applied: AtomicBool::new(false),
        }
    }

    /// Access the wrapped physical connection.
    #[must_use]
    pub fn connection(&self) -> &dyn PhysicalConnection {
        self.connection.as_ref()
    }

    /// Increment the reference count (a new acquirer started using this
    /// holder's connection).
    pub fn retain(&self) {
        self.reference_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the reference count; returns the count after decrementing.
    pub fn release(&self) -> u32 {
        self.reference_count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Current reference count.
    #[must_use]
    pub fn reference_count(&self) -> u32 {
        self.reference_count.load(Ordering::SeqCst)
    }

    /// Whether a transaction is active on this holder.
    #[must_use]
    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active.load(Ordering::SeqCst)
    }

    /// Mark the holder's transaction active/inactive.
    pub fn set_transaction_active(&self, active: bool) {
        self.transaction_active.store(active, Ordering::SeqCst);
    }

    /// Whether the holder is globally marked rollback-only (escalated by a
    /// participant that cannot roll back without affecting scopes above it).
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    /// Escalate rollback-only onto the holder.
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    /// Reset the holder's rollback-only flag (done once the owning
    /// transaction completes).
    pub fn clear_rollback_only(&self) {
        self.rollback_only.store(false, Ordering::SeqCst);
    }

    /// Allocate the next savepoint name, e.g. `SAVEPOINT_1`, `SAVEPOINT_2`,
    /// … The counter is monotonic for the lifetime of the holder.
    #[must_use]
    pub fn next_savepoint_name(&self) -> String {
        let n = self.savepoint_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("SAVEPOINT_{n}")
    }

    /// Whether synchronization callbacks were activated for the
    /// transaction currently bound to this holder.
    #[must_use]
    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction.load(Ordering::SeqCst)
    }

    /// Mark whether synchronization is active for this holder's transaction.
    pub fn set_synchronized_with_transaction(&self, value: bool) {
        self.synchronized_with_transaction.store(value, Ordering::SeqCst);
    }

    /// Set the transaction's deadline, `timeout` from now.
    pub fn set_deadline(&self, timeout: Duration) {
        let mut deadline = self.deadline.lock().unwrap_or_else(|e| e.into_inner());
        *deadline = Some(Instant::now() + timeout);
    }

    /// Time remaining before the deadline elapses.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::TimedOut`] if a deadline was set and has
    /// already elapsed.
    pub fn remaining_time(&self) -> Result<Option<Duration>> {
        let deadline = *self.deadline.lock().unwrap_or_else(|e| e.into_inner());
        match deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(TransactionError::TimedOut.into())
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }

    /// Record the auto-commit value observed before the manager changed it.
    pub fn record_previous_auto_commit(&self, value: bool) {
        *self
            .previous_auto_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(value);
    }

    /// Take (and clear) the recorded previous auto-commit value, if any.
    pub fn take_previous_auto_commit(&self) -> Option<bool> {
        self.previous_auto_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Record the isolation level observed before the manager changed it.
    pub fn record_previous_isolation(&self, value: IsolationLevel) {
        *self
            .previous_isolation
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(value);
    }

    /// Take (and clear) the recorded previous isolation level, if any.
    pub fn take_previous_isolation(&self) -> Option<IsolationLevel> {
        self.previous_isolation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Mark that the manager itself applied read-only to the connection
    /// (so cleanup knows to unset it).
    pub fn set_read_only_applied(&self, value: bool) {
        self.read_only_applied.store(value, Ordering::SeqCst);
    }

    /// Whether the manager applied read-only and must unset it on cleanup.
    #[must_use]
    pub fn read_only_applied(&self) -> bool {
        self.read_only_applied.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHolder")
            .field("reference_count", &self.reference_count())
            .field("transaction_active", &self.is_transaction_active())
            .field("rollback_only", &self.is_rollback_only())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_support::FakeSource;
    use crate::driver::ConnectionSource;

    async fn new_holder() -> ConnectionHolder {
        let source = FakeSource::new(true);
        let conn = source.get_connection().await.unwrap();
        ConnectionHolder::new(conn)
    }

    #[tokio::test]
    async fn test_savepoint_counter_monotonic() {
        let holder = new_holder().await;
        assert_eq!(holder.next_savepoint_name(), "SAVEPOINT_1");
        assert_eq!(holder.next_savepoint_name(), "SAVEPOINT_2");
    }

    #[tokio::test]
    async fn test_rollback_only_sticky_until_cleared() {
        let holder = new_holder().await;
        assert!(!holder.is_rollback_only());
        holder.set_rollback_only();
        assert!(holder.is_rollback_only());
        holder.clear_rollback_only();
        assert!(!holder.is_rollback_only());
    }

    #[tokio::test]
    async fn test_deadline_elapsed() {
        let holder = new_holder().await;
        holder.set_deadline(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            holder.remaining_time(),
            Err(crate::core::Error::Transaction(TransactionError::TimedOut))
        ));
    }

    #[tokio::test]
    async fn test_reference_counting() {
        let holder = new_holder().await;
        assert_eq!(holder.reference_count(), 0);
        holder.retain();
        holder.retain();
        assert_eq!(holder.reference_count(), 2);
        assert_eq!(holder.release(), 1);
    }
}
