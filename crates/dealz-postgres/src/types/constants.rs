//! Domain constants shared between models and repositories.

/// Account-related constants.
pub mod account {
    /// Role granted to every account at creation.
    pub const DEFAULT_ROLE: &str = "USER";

    /// Role required for administrative routes.
    pub const ADMIN_ROLE: &str = "ADMIN";
}
