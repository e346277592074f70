//! SQLite connection source

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;
use std::str::FromStr;

use crate::core::DriverError;
use crate::driver::{ConnectionSource, PhysicalConnection};

use super::SqliteConnection;

/// A [`ConnectionSource`] that opens a fresh, non-pooled `sqlx` SQLite
/// connection per [`ConnectionSource::get_connection`] call.
///
/// Holding a [`SqliteSource`] behind an `Arc` and sharing that `Arc` across
/// every [`crate::manager::TransactionManager`] that should see the same
/// database is what makes [`crate::driver::ConnectionSourceId`] identity
/// work.
#[derive(Debug)]
pub struct SqliteSource {
    path: String,
}

impl SqliteSource {
    /// Point at a file path (or `:memory:`).
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Convenience constructor for an in-memory database.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(":memory:")
    }
}

#[async_trait]
impl ConnectionSource for SqliteSource {
    async fn get_connection(&self) -> std::result::Result<Box<dyn PhysicalConnection>, DriverError> {
        let options = if self.path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DriverError::message(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
        };

        let options = options.disable_statement_logging().clone();

        let conn = options
            .connect()
            .await
            .map_err(|e| DriverError::message(e.to_string()).with_source(e))?;

        Ok(Box::new(SqliteConnection::new(conn)))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let source = SqliteSource::memory();
        let conn = source.get_connection().await;
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn test_driver_name() {
        let source = SqliteSource::memory();
        assert_eq!(source.name(), "sqlite");
    }
}
