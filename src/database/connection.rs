//! Self-closing, auto-reconnecting logical connection.
//!
//! A [`ManagedConnection`] owns at most one backend session behind a
//! `tokio::sync::RwLock`. Statements run under the read guard, so several
//! callers may have I/O in flight on the same session. Opening, closing and
//! reconnecting take the write guard, so the idle watchdog can never close a
//! session while a statement is running on it.
//!
//! Every successful open arms the watchdog, whichever path opened the session.
//!
//! A failed statement triggers exactly one reconnect and one retry. Each open
//! bumps a generation counter; a caller whose statement failed only tears the
//! session down if the generation is still the one it failed on, so concurrent
//! failures on the same session collapse into a single reconnect.

use crate::catalog::{QueryParams, QueryTemplate};
use crate::config::{ConnectionSettings, Vendor};
use crate::database::connection_string::ConnectionDescriptor;
use crate::database::metrics::{ConnectionMetrics, MetricsSnapshot};
use crate::database::open_factory;
use crate::database::result::QueryOutcome;
use crate::database::traits::{Session, SessionFactory};
use crate::database::watchdog::{IdleWatchdog, WatchdogTicket};
use crate::error::{DatabaseError, DbResult};
use serde::Serialize;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct SessionSlot {
    session: Option<Box<dyn Session>>,
    generation: u64,
}

struct Shared {
    me: Weak<Shared>,
    descriptor: ConnectionDescriptor,
    factory: Arc<dyn SessionFactory>,
    slot: RwLock<SessionSlot>,
    watchdog: IdleWatchdog,
    metrics: ConnectionMetrics,
}

impl Shared {
    fn arm_watchdog(&self) {
        let shared = self.me.clone();
        self.watchdog.arm(move |ticket| async move {
            if let Some(shared) = shared.upgrade() {
                shared.close_if_idle(ticket).await;
            }
        });
    }

    async fn open_into(&self, slot: &mut SessionSlot) -> DbResult<()> {
        match self.factory.open().await {
            Ok(session) => {
                slot.session = Some(session);
                slot.generation += 1;
                self.metrics.record_session_opened();
                self.arm_watchdog();
                info!(
                    driver = self.factory.name(),
                    generation = slot.generation,
                    "Opened session to {}",
                    self.descriptor.redacted_uri()
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_connection_error();
                warn!(driver = self.factory.name(), "Failed to open session: {}", e);
                Err(e)
            }
        }
    }

    async fn teardown(&self, slot: &mut SessionSlot) -> bool {
        let Some(session) = slot.session.take() else {
            return false;
        };
        if let Err(e) = session.close().await {
            warn!("Error while closing session: {}", e);
        }
        self.metrics.record_session_closed();
        true
    }

    /// Read guard over a slot that holds a session, opening one if absent.
    async fn read_open(&self) -> DbResult<RwLockReadGuard<'_, SessionSlot>> {
        {
            let slot = self.slot.read().await;
            if slot.session.is_some() {
                return Ok(slot);
            }
        }

        let mut slot = self.slot.write().await;
        if slot.session.is_none() {
            self.open_into(&mut slot).await?;
        }
        Ok(RwLockWriteGuard::downgrade(slot))
    }

    /// Replaces the session that failed in `failed_generation`, unless another
    /// caller already did.
    async fn recover(&self, failed_generation: u64) -> DbResult<RwLockReadGuard<'_, SessionSlot>> {
        let mut slot = self.slot.write().await;
        if slot.generation == failed_generation || slot.session.is_none() {
            self.teardown(&mut slot).await;
            self.open_into(&mut slot).await?;
            self.metrics.record_reconnect();
            info!("Reconnected to {}", self.descriptor.redacted_uri());
        } else {
            debug!(
                failed_generation,
                current_generation = slot.generation,
                "Session already replaced by a concurrent caller"
            );
        }
        Ok(RwLockWriteGuard::downgrade(slot))
    }

    async fn close_if_idle(&self, ticket: WatchdogTicket) {
        let mut slot = self.slot.write().await;
        if !ticket.is_current() {
            debug!("Idle timer superseded by newer activity");
            return;
        }
        if self.teardown(&mut slot).await {
            self.metrics.record_idle_closure();
            info!(
                "Connection to {} closed due to inactivity",
                self.descriptor.redacted_uri()
            );
        }
    }
}

/// Cloneable handle to one logical database connection.
#[derive(Clone)]
pub struct ManagedConnection {
    shared: Arc<Shared>,
}

impl ManagedConnection {
    /// Builds a connection for `descriptor` using the native driver for its vendor.
    ///
    /// No session is opened until [`connect`](Self::connect) or the first
    /// [`execute`](Self::execute).
    pub fn new(descriptor: ConnectionDescriptor, settings: &ConnectionSettings) -> DbResult<Self> {
        let factory = open_factory(&descriptor, settings.connect_timeout)?;
        Ok(Self::with_factory(descriptor, factory, settings.idle_timeout))
    }

    pub fn with_factory(
        descriptor: ConnectionDescriptor,
        factory: Arc<dyn SessionFactory>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new_cyclic(|me| Shared {
                me: me.clone(),
                descriptor,
                factory,
                slot: RwLock::new(SessionSlot::default()),
                watchdog: IdleWatchdog::new(idle_timeout),
                metrics: ConnectionMetrics::new(),
            }),
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.shared.descriptor
    }

    pub fn idle_timeout(&self) -> Duration {
        self.shared.watchdog.timeout()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Whether a backend session is currently held.
    pub async fn is_open(&self) -> bool {
        self.shared.slot.read().await.session.is_some()
    }

    /// Opens a session if none is held, then re-arms the idle watchdog.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ConnectionFailed`] if the open fails.
    pub async fn connect(&self) -> DbResult<()> {
        {
            let mut slot = self.shared.slot.write().await;
            if slot.session.is_none() {
                self.shared.open_into(&mut slot).await?;
            }
        }
        self.shared.arm_watchdog();
        Ok(())
    }

    /// Runs `template` with `params`, reopening the session if it is closed.
    ///
    /// Any failure leads to one reconnect and one retry.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::MissingParameter`] if a placeholder has no value
    /// - [`DatabaseError::ConnectionFailed`] if the reconnect itself fails
    /// - [`DatabaseError::QueryExecution`] if the retry fails
    #[instrument(skip_all, fields(template = template.name()))]
    pub async fn execute(&self, template: &QueryTemplate, params: &QueryParams) -> DbResult<QueryOutcome> {
        self.shared.arm_watchdog();
        let bound = template.bind(self.shared.factory.placeholder_style(), params)?;
        let metrics = &self.shared.metrics;

        let failed_generation = match self.shared.read_open().await {
            Ok(slot) => {
                let generation = slot.generation;
                let session = slot.session.as_deref().ok_or(DatabaseError::NotConnected)?;
                match session.execute(&bound.sql, &bound.params).await {
                    Ok(outcome) => {
                        metrics.record_query_executed();
                        return Ok(outcome);
                    }
                    Err(e) => {
                        metrics.record_query_error();
                        warn!("Execution failed, reconnecting once: {}", e);
                        generation
                    }
                }
            }
            Err(e) => {
                warn!("Could not open session, reconnecting once: {}", e);
                self.shared.slot.read().await.generation
            }
        };

        let slot = self.shared.recover(failed_generation).await?;
        let session = slot.session.as_deref().ok_or(DatabaseError::NotConnected)?;
        match session.execute(&bound.sql, &bound.params).await {
            Ok(outcome) => {
                metrics.record_query_executed();
                Ok(outcome)
            }
            Err(e) => {
                metrics.record_query_error();
                warn!("Execution failed after reconnect: {}", e);
                Err(DatabaseError::QueryExecution { source: Box::new(e) })
            }
        }
    }

    /// Tears down any session and opens a fresh one.
    pub async fn reconnect(&self) -> DbResult<()> {
        {
            let mut slot = self.shared.slot.write().await;
            self.shared.teardown(&mut slot).await;
            self.shared.open_into(&mut slot).await?;
        }
        self.shared.metrics.record_reconnect();
        self.shared.arm_watchdog();
        Ok(())
    }

    /// Cancels the watchdog and closes the session if one is held.
    ///
    /// Safe in every state, including never-opened and already-closed.
    pub async fn close(&self) {
        self.shared.watchdog.cancel();
        let mut slot = self.shared.slot.write().await;
        if self.shared.teardown(&mut slot).await {
            info!("Connection to {} closed", self.shared.descriptor.redacted_uri());
        }
    }

    /// Opens the connection and returns a guard that closes it on release or drop.
    pub async fn acquire(&self) -> DbResult<ScopedConnection> {
        self.connect().await?;
        Ok(ScopedConnection {
            connection: self.clone(),
            released: false,
        })
    }

    /// Runs `body` between an open and a guaranteed close.
    ///
    /// The close also happens if `body` fails or the returned future is dropped.
    pub async fn scoped<F, Fut, T>(&self, body: F) -> DbResult<T>
    where
        F: FnOnce(ManagedConnection) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let scope = self.acquire().await?;
        let result = body(scope.connection.clone()).await;
        scope.release().await;
        result
    }

    pub async fn metadata(&self) -> ConnectionMetadata {
        let d = &self.shared.descriptor;
        ConnectionMetadata {
            open: self.is_open().await,
            vendor: d.vendor,
            host: d.host.clone(),
            port: d.port,
            database: d.database.clone(),
            username: d.username.clone(),
            descriptor: d.redacted_uri(),
            idle_timeout_secs: self.idle_timeout().as_secs(),
            metrics: self.metrics(),
        }
    }
}

impl std::fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("descriptor", &self.shared.descriptor)
            .field("driver", &self.shared.factory.name())
            .field("watchdog", &self.shared.watchdog)
            .finish()
    }
}

/// Connection held open for one scope.
pub struct ScopedConnection {
    connection: ManagedConnection,
    released: bool,
}

impl ScopedConnection {
    pub async fn release(mut self) {
        self.released = true;
        self.connection.close().await;
    }
}

impl Deref for ScopedConnection {
    type Target = ManagedConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.connection.shared.watchdog.cancel();
        let connection = self.connection.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { connection.close().await });
            }
            Err(_) => warn!("No runtime to close a dropped scoped connection"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetadata {
    pub open: bool,
    pub vendor: Vendor,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub descriptor: String,
    pub idle_timeout_secs: u64,
    pub metrics: MetricsSnapshot,
}
