//! Transaction guard for automatic rollback on drop
//!
//! The mapper never starts or finishes transactions itself: callers begin a
//! [`TransactionGuard`] and hand a reference to the operations that should
//! run inside it.

use super::database::{Database, ExecResult};
use super::error::{DatabaseError, Result};
use super::value::{DatabaseResult, DatabaseValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Transaction guard that automatically rolls back on drop if not committed
///
/// # Example
///
/// ```ignore
/// let tx = TransactionGuard::begin(orm.connection().get_handle()?).await?;
/// orm.save(&mut order, Some(&tx)).await?;
/// orm.save(&mut line, Some(&tx)).await?;
/// tx.commit().await?;
/// ```
pub struct TransactionGuard<D: Database + 'static> {
    db: Arc<D>,
    committed: AtomicBool,
    rolled_back: AtomicBool,
}

impl<D: Database + 'static> TransactionGuard<D> {
    /// Begin a new transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the database is not connected or a transaction is
    /// already active.
    pub async fn begin(db: Arc<D>) -> Result<Self> {
        db.begin_transaction().await?;

        Ok(Self {
            db,
            committed: AtomicBool::new(false),
            rolled_back: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        if self.committed.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(format!(
                "Cannot {} on committed transaction",
                action
            )));
        }
        if self.rolled_back.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(format!(
                "Cannot {} on rolled back transaction",
                action
            )));
        }
        Ok(())
    }

    /// Execute a parameterized statement within the transaction
    pub async fn execute_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<ExecResult> {
        self.ensure_open("execute")?;
        self.db.execute_with_params(query, params).await
    }

    /// Query with parameters within the transaction
    pub async fn query_with_params(
        &self,
        query: &str,
        params: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        self.ensure_open("query")?;
        self.db.query_with_params(query, params).await
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails
    pub async fn commit(self) -> Result<()> {
        if self.rolled_back.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(
                "Cannot commit a rolled back transaction",
            ));
        }

        self.db.commit().await?;
        self.committed.store(true, Ordering::Release);
        Ok(())
    }

    /// Explicitly rollback the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails
    pub async fn rollback(self) -> Result<()> {
        if self.committed.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(
                "Cannot rollback a committed transaction",
            ));
        }

        self.db.rollback().await?;
        self.rolled_back.store(true, Ordering::Release);
        Ok(())
    }

    /// Check if the transaction has been committed
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Check if the transaction has been rolled back
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back.load(Ordering::Acquire)
    }
}

impl<D: Database + 'static> Drop for TransactionGuard<D> {
    fn drop(&mut self) {
        if self.committed.load(Ordering::Acquire) || self.rolled_back.load(Ordering::Acquire) {
            return;
        }

        let db = Arc::clone(&self.db);
        self.rolled_back.store(true, Ordering::Release);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                // Drop cannot await; run the rollback on its own runtime
                handle.spawn_blocking(move || match tokio::runtime::Runtime::new() {
                    Ok(rt) => {
                        if let Err(e) = rt.block_on(db.rollback()) {
                            error!(error = %e, "transaction auto-rollback failed");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "cannot create runtime for transaction auto-rollback");
                    }
                });
                warn!("transaction guard dropped without commit or rollback, rollback queued");
            }
            Err(_) => {
                warn!("transaction guard dropped outside a tokio runtime, rollback left to connection close");
            }
        }
    }
}
