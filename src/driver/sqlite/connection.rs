//! SQLite physical connection implementation

use async_trait::async_trait;
use sqlx::Connection as _;
use tokio::sync::Mutex;

use crate::core::{DriverError, IsolationLevel, Result};
use crate::driver::PhysicalConnection;

/// A single SQLite connection, guarded by an async mutex so the manager can
/// drive it through `&self` methods on the shared connection trait.
pub struct SqliteConnection {
    inner: Mutex<sqlx::SqliteConnection>,
}

impl SqliteConnection {
    pub(crate) fn new(inner: sqlx::SqliteConnection) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

fn driver_err(context: &str, e: sqlx::Error) -> crate::core::Error {
    let class = e.as_database_error().map(|_| "HY".to_string());
    let mut driver_error = DriverError::message(format!("{context}: {e}"));
    if let Some(class) = class {
        driver_error = driver_error.with_sqlstate_class(class);
    }
    driver_error.into()
}

#[async_trait]
impl PhysicalConnection for SqliteConnection {
    async fn get_auto_commit(&self) -> Result<bool> {
        let conn = self.inner.lock().await;
        Ok(!conn.is_in_a_transaction())
    }

    async fn set_auto_commit(&self, value: bool) -> Result<()> {
        // SQLite has no driver-level auto-commit switch: turning it off is
        // exactly issuing BEGIN, and turning it back on is a no-op since
        // commit()/rollback() already returned the connection to autocommit
        // mode by the time the manager restores this flag during cleanup.
        if value {
            return Ok(());
        }
        let mut conn = self.inner.lock().await;
        if conn.is_in_a_transaction() {
            return Ok(());
        }
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("set_auto_commit", e))?;
        Ok(())
    }

    async fn get_transaction_isolation(&self) -> Result<IsolationLevel> {
        Ok(IsolationLevel::Serializable)
    }

    async fn set_transaction_isolation(&self, _level: IsolationLevel) -> Result<()> {
        // SQLite has a single effective isolation level; accept and ignore.
        Ok(())
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        let mut conn = self.inner.lock().await;
        let sql = if read_only {
            "PRAGMA query_only = ON"
        } else {
            "PRAGMA query_only = OFF"
        };
        sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("set_read_only", e))?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut conn = self.inner.lock().await;
        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("commit", e))?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut conn = self.inner.lock().await;
        sqlx::query("ROLLBACK")
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("rollback", e))?;
        Ok(())
    }

    async fn set_savepoint(&self, name: &str) -> Result<()> {
        let mut conn = self.inner.lock().await;
        sqlx::query(&format!("SAVEPOINT {name}"))
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("set_savepoint", e))?;
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> Result<()> {
        let mut conn = self.inner.lock().await;
        sqlx::query(&format!("RELEASE SAVEPOINT {name}"))
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("release_savepoint", e))?;
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        let mut conn = self.inner.lock().await;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("rollback_to_savepoint", e))?;
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        true
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.inner.lock().await;
        let result = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| driver_err("execute", e))?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        // sqlx::Connection::close consumes self; a shared physical
        // connection can only be closed once all holders have dropped it,
        // so best-effort ping is enough for a single-connection source.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::driver::ConnectionSource;
    use crate::driver::sqlite::SqliteSource;

    #[tokio::test]
    async fn test_begin_commit_via_execute() {
        let source = SqliteSource::memory();
        let conn = source.get_connection().await.unwrap();

        conn.execute("BEGIN").await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        conn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_savepoint_round_trip() {
        let source = SqliteSource::memory();
        let conn = source.get_connection().await.unwrap();

        conn.execute("BEGIN").await.unwrap();
        conn.set_savepoint("SAVEPOINT_1").await.unwrap();
        conn.release_savepoint("SAVEPOINT_1").await.unwrap();
        conn.commit().await.unwrap();
    }
}
