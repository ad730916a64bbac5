//! Database client, connection pool, and migration plumbing.

mod pg_client;
mod pg_config;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;

pub use self::pg_client::{PgClient, PgPoolStatus};
pub use self::pg_config::PgConfig;

/// Deadpool-managed pool of async Postgres connections.
pub type ConnectionPool = deadpool::managed::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// A single pooled connection checked out from [`ConnectionPool`].
pub type PooledConnection =
    deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;
