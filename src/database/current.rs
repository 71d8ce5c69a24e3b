//! The connection diagnostics run against.

use crate::config::ConnectionSettings;
use crate::database::connection::{ConnectionMetadata, ManagedConnection};
use crate::database::connection_string::ConnectionDescriptor;
use crate::error::{DatabaseError, DbResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Holds at most one [`ManagedConnection`]; installing another closes the old one.
#[derive(Clone)]
pub struct CurrentConnection {
    settings: ConnectionSettings,
    slot: Arc<RwLock<Option<ManagedConnection>>>,
}

impl CurrentConnection {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            slot: Arc::new(RwLock::new(None)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Clone of the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotConnected`] when none is set.
    pub fn get(&self) -> DbResult<ManagedConnection> {
        self.slot.read().clone().ok_or(DatabaseError::NotConnected)
    }

    /// Builds a connection for `descriptor` and makes it current.
    ///
    /// The session itself opens on first use.
    pub async fn open(&self, descriptor: ConnectionDescriptor) -> DbResult<ManagedConnection> {
        let connection = ManagedConnection::new(descriptor, &self.settings)?;
        self.install(connection.clone()).await;
        Ok(connection)
    }

    pub async fn install(&self, connection: ManagedConnection) {
        info!("Current connection set to {}", connection.descriptor().redacted_uri());
        let previous = self.slot.write().replace(connection);
        if let Some(previous) = previous {
            debug!("Closing previous connection");
            previous.close().await;
        }
    }

    /// Closes and forgets the current connection; metadata of what was closed.
    pub async fn close(&self) -> Option<ConnectionMetadata> {
        let previous = self.slot.write().take()?;
        previous.close().await;
        Some(previous.metadata().await)
    }
}
