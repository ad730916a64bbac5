//! HTTP error types for all handlers.

mod http_error;

pub use self::http_error::{Error, ErrorKind, Result};
