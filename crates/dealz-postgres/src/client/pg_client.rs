//! High-level database client with pooling and migration support.

use std::fmt;
use std::sync::Arc;

use deadpool::managed::Pool;
use diesel_async::AsyncPgConnection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;

use crate::{
    ConnectionPool, PgConfig, PgError, PgResult, PooledConnection, TRACING_TARGET_CONNECTION,
    TRACING_TARGET_MIGRATION,
};

/// Connection pool status information.
#[derive(Debug, Clone)]
pub struct PgPoolStatus {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Current number of connections in the pool
    pub size: usize,
    /// Number of available connections
    pub available: usize,
    /// Number of requests waiting for connections
    pub waiting: usize,
}

impl PgPoolStatus {
    /// Returns the utilization percentage of the pool (0.0 to 1.0).
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.size - self.available) as f64 / self.max_size as f64
        }
    }

    /// Returns whether the pool is under pressure (high utilization or waiting requests).
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.waiting > 0 || self.utilization() > 0.8
    }
}

/// High-level database client that manages connections and migrations.
///
/// Cheaply cloneable; all clones share the same underlying pool.
#[derive(Clone)]
pub struct PgClient {
    inner: Arc<PgClientInner>,
}

struct PgClientInner {
    pool: ConnectionPool,
    config: PgConfig,
}

impl PgClient {
    /// Creates a new database client with the provided configuration.
    ///
    /// This establishes a connection pool but does not touch the database
    /// until the first connection is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the pool cannot
    /// be built.
    #[tracing::instrument(
        skip(config),
        target = TRACING_TARGET_CONNECTION,
        fields(database_url = %config.database_url_masked())
    )]
    pub fn new(config: PgConfig) -> PgResult<Self> {
        config.validate()?;

        tracing::info!(target: TRACING_TARGET_CONNECTION, "Initializing database client");

        let manager =
            AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.postgres_url.clone());

        let mut builder = Pool::builder(manager)
            .max_size(config.postgres_max_connections as usize)
            .runtime(deadpool::Runtime::Tokio1);

        if let Some(timeout) = config.connection_timeout() {
            builder = builder.wait_timeout(Some(timeout)).create_timeout(Some(timeout));
        }
        if let Some(timeout) = config.idle_timeout() {
            builder = builder.recycle_timeout(Some(timeout));
        }

        let pool = builder.build().map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                error = %e,
                "Failed to create connection pool"
            );
            PgError::Unexpected(format!("Failed to build connection pool: {}", e).into())
        })?;

        Ok(Self {
            inner: Arc::new(PgClientInner { pool, config }),
        })
    }

    /// Returns the configuration this client was built from.
    #[inline]
    pub fn config(&self) -> &PgConfig {
        &self.inner.config
    }

    /// Checks out a connection from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PgError::Timeout`] when the pool is exhausted for longer
    /// than the configured wait timeout, or a connection error when a fresh
    /// connection cannot be established.
    pub async fn get_connection(&self) -> PgResult<PooledConnection> {
        self.inner.pool.get().await.map_err(PgError::from)
    }

    /// Returns a snapshot of the pool's current status.
    pub fn pool_status(&self) -> PgPoolStatus {
        let status = self.inner.pool.status();
        PgPoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Verifies connectivity by checking out a single connection.
    pub async fn ping(&self) -> PgResult<()> {
        let _conn = self.get_connection().await?;
        Ok(())
    }

    /// Applies all pending embedded migrations.
    ///
    /// Runs on a blocking thread because the diesel migration harness is
    /// synchronous.
    pub async fn run_pending_migrations(&self) -> PgResult<()> {
        let database_url = self.inner.config.postgres_url.clone();

        let applied = tokio::task::spawn_blocking(move || -> PgResult<Vec<String>> {
            use diesel::Connection as _;
            use diesel_migrations::MigrationHarness as _;

            let mut conn =
                AsyncConnectionWrapper::<AsyncPgConnection>::establish(&database_url)
                    .map_err(PgError::Connection)?;

            let versions = conn
                .run_pending_migrations(crate::MIGRATIONS)
                .map_err(PgError::Migration)?;

            Ok(versions.iter().map(ToString::to_string).collect())
        })
        .await
        .map_err(|e| PgError::Unexpected(format!("Migration task panicked: {}", e).into()))??;

        if applied.is_empty() {
            tracing::debug!(target: TRACING_TARGET_MIGRATION, "No pending migrations");
        } else {
            tracing::info!(
                target: TRACING_TARGET_MIGRATION,
                migrations = ?applied,
                "Applied pending migrations"
            );
        }

        Ok(())
    }
}

impl fmt::Debug for PgClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgClient")
            .field("config", &self.inner.config)
            .field("pool_status", &self.pool_status())
            .finish()
    }
}
