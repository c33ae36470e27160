//! Connection lifecycle
//!
//! [`ConnectionManager`] owns the single shared handle to a backend. It is
//! either disconnected (no handle) or connected (handle plus the connection
//! string it was opened with, kept for reconnects).

use super::config::OrmConfig;
use super::database::Database;
use super::error::{DatabaseError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the live database handle and re-establishes it on demand
pub struct ConnectionManager<D: Database> {
    config: OrmConfig,
    handle: RwLock<Option<Arc<D>>>,
    connection_string: RwLock<Option<String>>,
}

impl<D: Database + 'static> ConnectionManager<D> {
    /// Create a disconnected manager
    pub fn new(config: OrmConfig) -> Self {
        Self {
            config,
            handle: RwLock::new(None),
            connection_string: RwLock::new(None),
        }
    }

    /// Configuration the manager builds backends from
    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    /// Open a connection to `data_source` and make it the shared handle
    ///
    /// # Errors
    ///
    /// Returns the driver error when the connection cannot be opened; any
    /// previously stored handle is kept in that case.
    pub async fn initialize(&self, data_source: &str) -> Result<Arc<D>> {
        let connection_string = D::connection_string(data_source);
        let db = D::from_config(&self.config);
        db.connect(&connection_string).await?;

        let db = Arc::new(db);
        *self.handle.write() = Some(Arc::clone(&db));
        *self.connection_string.write() = Some(connection_string);
        info!(backend = %db.database_type(), "database connection established");
        Ok(db)
    }

    /// Check the connection and reconnect once if the check fails
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotInitialized`] before [`initialize`], or the
    /// reconnect error when the single reconnect attempt fails.
    ///
    /// [`initialize`]: ConnectionManager::initialize
    pub async fn ensure_live(&self) -> Result<Arc<D>> {
        let db = self.get_handle()?;
        match db.ping().await {
            Ok(()) => Ok(db),
            Err(e) => {
                warn!(error = %e, "database ping failed, reconnecting");
                let connection_string = self
                    .connection_string
                    .read()
                    .clone()
                    .ok_or(DatabaseError::NotInitialized)?;
                db.connect(&connection_string).await?;
                info!(backend = %db.database_type(), "database connection re-established");
                Ok(db)
            }
        }
    }

    /// Current handle, without probing it
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotInitialized`] before a successful
    /// [`initialize`](ConnectionManager::initialize).
    pub fn get_handle(&self) -> Result<Arc<D>> {
        self.handle
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(DatabaseError::NotInitialized)
    }

    /// Whether a handle is stored
    pub fn is_initialized(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Disconnect and forget the handle
    pub async fn close(&self) -> Result<()> {
        let db = self.handle.write().take();
        self.connection_string.write().take();
        if let Some(db) = db {
            db.disconnect().await?;
            info!(backend = %db.database_type(), "database connection closed");
        }
        Ok(())
    }
}
