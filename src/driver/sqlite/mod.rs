//! SQLite-backed [`ConnectionSource`](super::ConnectionSource) implementation
//!
//! Provided for integration-style coverage of the coordinator against a
//! real driver (the `sqlite` feature). A full production pool is out of
//! scope — this hands out single, non-pooled `sqlx` connections, which is
//! sufficient since the coordinator owns transaction lifetime itself.

mod connection;
mod driver;

pub use connection::SqliteConnection;
pub use driver::SqliteSource;
