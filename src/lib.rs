//! # Rustine Txn
//!
//! Rustine Txn is a propagation-aware transaction coordinator for pooled
//! relational-database connections, in the spirit of Spring's
//! `PlatformTransactionManager`: `begin`/`commit`/`rollback` over a
//! [`core::Propagation`]-driven decision table, savepoint-based `NESTED`
//! scopes, suspend/resume of an outer transaction for `REQUIRES_NEW` and
//! `NOT_SUPPORTED`, and synchronization listeners observing the lifecycle
//! of whatever transaction is current.
//!
//! ## Modules
//!
//! - [`core`] - configuration, error, and propagation types
//! - [`driver`] - the external [`driver::ConnectionSource`]/[`driver::PhysicalConnection`]
//!   collaborator traits, plus the bundled `sqlite` feature
//! - [`holder`] - [`holder::ConnectionHolder`], the owner of one physical connection's
//!   transactional state
//! - [`registry`] - the per-execution-context resource and synchronization registry
//! - [`sync`] - the [`sync::Synchronization`] listener protocol
//! - [`txn`] - [`txn::Transaction`], the status handle `begin` returns
//! - [`propagation`] - the pure propagation decision table
//! - [`manager`] - [`manager::TransactionManager`], the orchestrator
//! - [`template`] - [`template::TransactionTemplate`], the callback-style convenience wrapper
//! - [`translate`] - the driver-error translation hook
//! - [`facade`] - [`facade::TransactionAwareConnectionSource`], a transaction-aware connection front door
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rustine_txn::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let source: Arc<dyn ConnectionSource> = Arc::new(SqliteSource::memory());
//!     let manager = Arc::new(TransactionManager::new(source));
//!     let template = TransactionTemplate::new(manager);
//!
//!     template
//!         .execute(|_status| async move {
//!             // run statements against a facade or driver of your choosing
//!             Ok(())
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod driver;
pub mod facade;
pub mod holder;
pub mod manager;
pub mod propagation;
pub mod registry;
pub mod sync;
pub mod template;
pub mod translate;
pub mod txn;

/// Prelude module for convenient imports.
///
/// ```rust
/// use rustine_txn::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        Error, IsolationLevel, ManagerOptions, Propagation, Result, SynchronizationMode,
        TransactionDefinition, TransactionError,
    };

    pub use crate::driver::{ConnectionSource, ConnectionSourceId, PhysicalConnection};

    #[cfg(feature = "sqlite")]
    pub use crate::driver::sqlite::{SqliteConnection, SqliteSource};

    pub use crate::facade::{AcquiredConnection, TransactionAwareConnectionSource};
    pub use crate::manager::TransactionManager;
    pub use crate::sync::{register_synchronization, CompletionStatus, Synchronization};
    pub use crate::template::TransactionTemplate;
    pub use crate::translate::{DefaultExceptionTranslator, ExceptionTranslator};
    pub use crate::txn::{Savepoint, Transaction};
}

pub use core::{Error, Result};
pub use manager::TransactionManager;
