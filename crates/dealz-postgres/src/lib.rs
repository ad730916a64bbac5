#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Embeds all migrations into the final binary.
pub(crate) const MIGRATIONS: diesel_migrations::EmbeddedMigrations =
    diesel_migrations::embed_migrations!();

// Tracing target constants for consistent logging.

/// Tracing target for client-related operations.
pub const TRACING_TARGET_CLIENT: &str = "dealz_postgres::client";

/// Tracing target for database query operations.
pub const TRACING_TARGET_QUERY: &str = "dealz_postgres::query";

/// Tracing target for database migration operations.
pub const TRACING_TARGET_MIGRATION: &str = "dealz_postgres::migrations";

/// Tracing target for database connection operations.
pub const TRACING_TARGET_CONNECTION: &str = "dealz_postgres::connection";

mod client;
mod error;
pub mod model;
pub mod query;
mod schema;
pub mod types;

pub use diesel_async::AsyncPgConnection as PgConnection;

pub use crate::client::{ConnectionPool, PgClient, PgConfig, PgPoolStatus, PooledConnection};
pub use crate::error::{BoxError, PgError, PgResult};
