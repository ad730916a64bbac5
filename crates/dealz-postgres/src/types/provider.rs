//! Federated identity provider tags.

use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

/// Identity provider an account was provisioned through.
///
/// `SelfManaged` accounts registered with an email/password pair; all other
/// variants were auto-provisioned after a successful external identity
/// handshake and carry a provider-assigned subject id.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize, DbEnum,
    ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::AccountProvider"]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountProvider {
    /// Local email/password registration.
    #[default]
    SelfManaged,
    /// Google OAuth 2.0 / OpenID Connect.
    Google,
}

impl AccountProvider {
    /// Returns whether accounts with this provider authenticate locally.
    #[inline]
    pub fn is_self_managed(self) -> bool {
        matches!(self, Self::SelfManaged)
    }

    /// Returns whether this provider is an external identity provider.
    #[inline]
    pub fn is_federated(self) -> bool {
        !self.is_self_managed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(AccountProvider::SelfManaged.to_string(), "self_managed");
        assert_eq!(AccountProvider::Google.to_string(), "google");
    }

    #[test]
    fn google_is_federated() {
        assert!(AccountProvider::Google.is_federated());
        assert!(!AccountProvider::SelfManaged.is_federated());
    }
}
