//! Transaction-aware connection facade
//!
//! A thin front door for code that just wants "the connection to run a
//! statement on" without caring whether a transaction is active: if one is
//! bound to the execution context for the wrapped source, it's reused and
//! its timeout enforced; otherwise a standalone connection is acquired and
//! closed again once released. A lazy pooling proxy and a full
//! transaction-aware `DataSource` replacement are out of scope — this only
//! proxies the operations the coordinator itself defines on
//! [`crate::driver::PhysicalConnection`].

use std::sync::Arc;

use crate::core::{Error, Result};
use crate::driver::{ConnectionSource, ConnectionSourceId, PhysicalConnection};
use crate::holder::ConnectionHolder;
use crate::registry;

/// Hands out [`AcquiredConnection`]s that transparently join whatever
/// transaction is active on the current execution context for `source`.
pub struct TransactionAwareConnectionSource {
    source: Arc<dyn ConnectionSource>,
    source_id: ConnectionSourceId,
}

impl TransactionAwareConnectionSource {
    /// Wrap `source`. Constructing more than one facade over the same
    /// `Arc` clone is fine — they share the same [`ConnectionSourceId`] and
    /// so observe the same bound transaction.
    #[must_use]
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        let source_id = ConnectionSourceId::of(&source);
        Self { source, source_id }
    }

    /// Acquire a connection: transactional if one is bound for this source
    /// on the current execution context, standalone otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::TransactionError::TimedOut`] if a bound
    /// transaction's deadline has already elapsed, or a
    /// [`crate::core::Error::Driver`] if acquiring a standalone connection fails.
    pub async fn acquire(&self) -> Result<AcquiredConnection> {
        match registry::get_resource(self.source_id) {
            Some(holder) => {
                holder.remaining_time()?;
                holder.retain();
                Ok(AcquiredConnection::Transactional(holder))
            }
            None => {
                let connection = self.source.get_connection().await.map_err(Error::from)?;
                Ok(AcquiredConnection::Standalone(connection))
            }
        }
    }
}

/// A connection handed out by [`TransactionAwareConnectionSource::acquire`].
pub enum AcquiredConnection {
    /// Participating in the transaction bound to the execution context.
    Transactional(Arc<ConnectionHolder>),
    /// Not participating in any transaction; owned outright by the caller.
    Standalone(Box<dyn PhysicalConnection>),
}

impl AcquiredConnection {
    fn connection(&self) -> &dyn PhysicalConnection {
        match self {
            Self::Transactional(holder) => holder.connection(),
            Self::Standalone(connection) => connection.as_ref(),
        }
    }

    /// Whether this connection is participating in an active transaction.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transactional(_))
    }

    /// Execute a statement through the underlying connection, checking the
    /// owning transaction's deadline first when transactional.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::TransactionError::TimedOut`] if the owning
    /// transaction's deadline has elapsed, otherwise propagates whatever
    /// [`PhysicalConnection::execute`] returns.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        if let Self::Transactional(holder) = self {
            holder.remaining_time()?;
        }
        self.connection().execute(sql).await
    }

    /// Release the connection. A transactional connection simply gives up
    /// its share of the reference count (the owning transaction still
    /// controls its lifetime); a standalone connection is closed outright.
    ///
    /// # Errors
    ///
    /// Propagates a standalone connection's [`PhysicalConnection::close`] failure.
    pub async fn release(self) -> Result<()> {
        match self {
            Self::Transactional(holder) => {
                holder.release();
                Ok(())
            }
            Self::Standalone(connection) => connection.close().await,
        }
    }
}
