//! Request extractors for authentication and request bodies.

mod auth;
mod client_addr;
mod reject;

pub use self::auth::{SessionClaims, SessionHeader, SessionState, TokenKind};
pub use self::client_addr::ClientAddr;
pub use self::reject::{Json, ValidateJson};
