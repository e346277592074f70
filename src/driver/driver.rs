//! Connection-source trait — the external pool/factory collaborator
//!
//! The coordinator never implements pooling, retry, or connection reuse
//! policy itself; it only needs a way to obtain a fresh physical connection
//! on demand and to know the source's own identity (used as the key into
//! the execution-context resource registry, see [`ConnectionSourceId`]).

use async_trait::async_trait;

use crate::core::{DriverError, Result};

use super::PhysicalConnection;

/// An external connection source (pool, single-connection factory, …).
///
/// Implementors are expected to be cheap to hold behind an `Arc` and shared
/// across every [`crate::manager::TransactionManager`] bound to the same
/// physical database.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Acquire a new physical connection from the source.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the source cannot produce a connection
    /// (refused, pool exhausted, authentication failure, …).
    async fn get_connection(&self) -> std::result::Result<Box<dyn PhysicalConnection>, DriverError>;

    /// Name of this source, used only for diagnostics/logging.
    fn name(&self) -> &'static str;
}

/// Identity of a [`ConnectionSource`], used as the registry key.
///
/// Two distinct sources are independent; the same source referenced twice
/// (e.g. through two [`crate::manager::TransactionManager`] instances
/// sharing one `Arc`) keys the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionSourceId(usize);

impl ConnectionSourceId {
    /// Derive the identity of a connection source from its `Arc` pointer.
    ///
    /// This intentionally does not require `ConnectionSource: Eq` — identity
    /// is purely about which `Arc` allocation is shared, not the value of
    /// whatever it wraps.
    #[must_use]
    pub fn of(source: &std::sync::Arc<dyn ConnectionSource>) -> Self {
        let ptr: *const dyn ConnectionSource = std::sync::Arc::as_ptr(source);
        Self(ptr.cast::<()>() as usize)
    }
}

/// A no-op connection source useful for tests that exercise the coordinator
/// without any real driver.
#[cfg(test)]
pub(crate) mod test_support {
    use super::{ConnectionSource, DriverError, PhysicalConnection};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use crate::core::Result;
    use crate::core::IsolationLevel;

    /// Records every call made to a fake physical connection, in order, so
    /// tests can assert call pairing and ordering.
    #[derive(Debug, Default)]
    pub struct CallLog {
        pub(crate) events: std::sync::Mutex<Vec<String>>,
    }

    impl CallLog {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn push(&self, event: impl Into<String>) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event.into());
        }
    }

    /// A fake physical connection whose every method records an event and
    /// can be made to fail on demand.
    pub struct FakeConnection {
        id: u64,
        pub log: Arc<CallLog>,
        pub supports_savepoints: bool,
        pub fail_commit: std::sync::atomic::AtomicBool,
        pub auto_commit: std::sync::atomic::AtomicBool,
        pub isolation: std::sync::Mutex<IsolationLevel>,
    }

    impl FakeConnection {
        fn new(id: u64, log: Arc<CallLog>, supports_savepoints: bool) -> Self {
            Self {
                id,
                log,
                supports_savepoints,
                fail_commit: std::sync::atomic::AtomicBool::new(false),
                auto_commit: std::sync::atomic::AtomicBool::new(true),
                isolation: std::sync::Mutex::new(IsolationLevel::ReadCommitted),
            }
        }
    }

    #[async_trait]
    impl PhysicalConnection for FakeConnection {
        async fn get_auto_commit(&self) -> Result<bool> {
            Ok(self.auto_commit.load(Ordering::SeqCst))
        }

        async fn set_auto_commit(&self, value: bool) -> Result<()> {
            self.log.push(format!("con{}.setAutoCommit({value})", self.id));
            self.auto_commit.store(value, Ordering::SeqCst);
            Ok(())
        }

        async fn get_transaction_isolation(&self) -> Result<IsolationLevel> {
            Ok(*self.isolation.lock().unwrap_or_else(|e| e.into_inner()))
        }

        async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
            self.log
                .push(format!("con{}.setTransactionIsolation({level})", self.id));
            *self.isolation.lock().unwrap_or_else(|e| e.into_inner()) = level;
            Ok(())
        }

        async fn set_read_only(&self, read_only: bool) -> Result<()> {
            self.log.push(format!("con{}.setReadOnly({read_only})", self.id));
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            self.log.push(format!("con{}.commit", self.id));
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(crate::core::DriverError::message("commit failed").into());
            }
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            self.log.push(format!("con{}.rollback", self.id));
            Ok(())
        }

        async fn set_savepoint(&self, name: &str) -> Result<()> {
            self.log.push(format!("con{}.setSavepoint({name})", self.id));
            Ok(())
        }

        async fn release_savepoint(&self, name: &str) -> Result<()> {
            self.log
                .push(format!("con{}.releaseSavepoint({name})", self.id));
            Ok(())
        }

        async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
            self.log.push(format!("con{}.rollback({name})", self.id));
            Ok(())
        }

        fn supports_savepoints(&self) -> bool {
            self.supports_savepoints
        }

        async fn execute(&self, sql: &str) -> Result<u64> {
            self.log.push(format!("con{}.execute({sql})", self.id));
            Ok(0)
        }

        async fn close(&self) -> Result<()> {
            self.log.push(format!("con{}.close", self.id));
            Ok(())
        }
    }

    impl std::fmt::Debug for FakeConnection {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FakeConnection").field("id", &self.id).finish()
        }
    }

    /// A [`ConnectionSource`] that hands out [`FakeConnection`]s sharing one [`CallLog`].
    pub struct FakeSource {
        pub log: Arc<CallLog>,
        pub supports_savepoints: bool,
        pub fail_commit: bool,
        next_id: AtomicU64,
    }

    impl FakeSource {
        pub fn new(supports_savepoints: bool) -> Self {
            Self {
                log: Arc::new(CallLog::default()),
                supports_savepoints,
                fail_commit: false,
                next_id: AtomicU64::new(1),
            }
        }

        /// A source whose connections fail every `commit()` call, for
        /// exercising `rollback_on_commit_failure` handling.
        pub fn new_failing_commit() -> Self {
            Self {
                fail_commit: true,
                ..Self::new(true)
            }
        }
    }

    #[async_trait]
    impl ConnectionSource for FakeSource {
        async fn get_connection(&self) -> std::result::Result<Box<dyn PhysicalConnection>, DriverError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let conn = FakeConnection::new(id, self.log.clone(), self.supports_savepoints);
            conn.fail_commit.store(self.fail_commit, Ordering::SeqCst);
            Ok(Box::new(conn))
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }
}
