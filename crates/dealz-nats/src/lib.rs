#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Tracing target constants for consistent logging.

/// Tracing target for client-related operations.
pub const TRACING_TARGET_CLIENT: &str = "dealz_nats::client";

/// Tracing target for connection lifecycle events.
pub const TRACING_TARGET_CONNECTION: &str = "dealz_nats::connection";

/// Tracing target for stream publish/subscribe operations.
pub const TRACING_TARGET_STREAM: &str = "dealz_nats::stream";

mod client;
mod error;
pub mod stream;

pub use crate::client::{NatsClient, NatsConfig};
pub use crate::error::{Error, Result};
