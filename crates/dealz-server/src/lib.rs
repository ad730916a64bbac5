#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for authentication and token verification.
pub const TRACING_TARGET_AUTHENTICATION: &str = "dealz_server::authentication";

pub mod extract;
pub mod handler;
pub mod middleware;
pub mod service;

pub use crate::handler::{Error, ErrorKind, Result};
