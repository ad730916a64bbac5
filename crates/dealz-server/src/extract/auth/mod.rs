//! Authentication extractors.
//!
//! # Key Types
//!
//! - [`SessionClaims`] - signed token claims (the credential codec)
//! - [`TokenKind`] - access/refresh discriminator claim
//! - [`SessionHeader`] - bearer token extractor (signature + expiry only)
//! - [`SessionState`] - fully verified identity (codec + ledger + account)

mod session_claims;
mod session_header;
mod session_state;

pub use self::session_claims::{SessionClaims, TokenKind};
pub use self::session_header::SessionHeader;
pub use self::session_state::SessionState;
