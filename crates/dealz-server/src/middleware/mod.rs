//! Route-level authentication and authorization layers.
//!
//! Route classification is expressed by router composition: public routes
//! are mounted bare, authenticated routes behind [`require_authentication`],
//! and administrative routes behind [`require_admin`].

mod require_admin;
mod require_auth;

pub use self::require_admin::require_admin;
pub use self::require_auth::require_authentication;
