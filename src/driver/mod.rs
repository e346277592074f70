//! # Driver Module
//!
//! External collaborator traits: [`ConnectionSource`] (the pool/datasource)
//! and [`PhysicalConnection`] (a single connection), plus the bundled
//! `sqlite` feature's concrete implementation.
//!
//! Neither trait attempts to model query execution, result sets, or schema
//! introspection — those are out of scope. The traits expose exactly the
//! surface the transaction coordinator's orchestration needs.

pub mod connection;
pub mod driver;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use connection::*;
pub use driver::{ConnectionSource, ConnectionSourceId};

#[cfg(test)]
pub(crate) use driver::test_support;
