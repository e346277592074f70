//! Physical-connection trait — the external collaborator consumed by the
//! manager.
//!
//! This is deliberately narrow: query execution, result-set handling, and
//! schema introspection are out of scope. The trait exposes exactly the
//! operations the manager's `begin`/`commit`/`rollback` orchestration needs,
//! plus a single `execute` escape hatch so a transaction's callback can
//! still run statements (e.g. the `SET TRANSACTION READ ONLY` the manager
//! itself issues).

use async_trait::async_trait;

use crate::core::{IsolationLevel, Result};

/// A single physical database connection.
#[async_trait]
pub trait PhysicalConnection: Send + Sync {
    /// Read the connection's current auto-commit setting.
    async fn get_auto_commit(&self) -> Result<bool>;

    /// Set the connection's auto-commit setting.
    async fn set_auto_commit(&self, value: bool) -> Result<()>;

    /// Read the connection's current isolation level.
    async fn get_transaction_isolation(&self) -> Result<IsolationLevel>;

    /// Set the connection's isolation level.
    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()>;

    /// Mark the connection read-only (or read-write).
    async fn set_read_only(&self, read_only: bool) -> Result<()>;

    /// Commit the current physical transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the current physical transaction.
    async fn rollback(&self) -> Result<()>;

    /// Create a savepoint with the given name.
    async fn set_savepoint(&self, name: &str) -> Result<()>;

    /// Release a previously created savepoint, keeping the enclosing
    /// transaction intact.
    async fn release_savepoint(&self, name: &str) -> Result<()>;

    /// Roll back to a previously created savepoint without ending the
    /// enclosing transaction.
    async fn rollback_to_savepoint(&self, name: &str) -> Result<()>;

    /// Whether this connection's driver metadata reports savepoint support.
    fn supports_savepoints(&self) -> bool;

    /// Execute a statement that doesn't return rows (used by callbacks and
    /// by the manager itself for `SET TRANSACTION READ ONLY`).
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Release the physical connection back to its source.
    async fn close(&self) -> Result<()>;
}
