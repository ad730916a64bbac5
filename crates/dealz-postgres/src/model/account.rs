//! Account model for PostgreSQL database operations.
//!
//! The account is the identity record of the marketplace: it carries the
//! institution affiliation, the (optional) local password hash, the federated
//! provider linkage, and the role set used for route-level authorization.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::accounts;
use crate::types::AccountProvider;
use crate::types::constants::account;

/// A user account.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Account {
    /// Unique account identifier.
    pub id: Uuid,
    /// University this account is affiliated with. Every account has exactly
    /// one affiliation, fixed at provisioning time by the email domain.
    pub university_id: Uuid,
    /// Human-readable name for UI and communications.
    pub display_name: String,
    /// Primary email, lowercased; doubles as the external username.
    pub email_address: String,
    /// Argon2id hash of the local password. `None` for accounts provisioned
    /// through a federated identity provider.
    pub password_hash: Option<String>,
    /// Soft kill-switch; disabled accounts cannot log in or refresh.
    pub is_enabled: bool,
    /// Email verification status. Federated accounts are created verified.
    pub is_verified: bool,
    /// Identity provider this account was provisioned through.
    pub provider: AccountProvider,
    /// Provider-assigned subject id for federated accounts.
    pub provider_subject: Option<String>,
    /// Role names; never empty after creation.
    pub roles: Vec<String>,
    /// Timestamp when the account was created.
    pub created_at: Timestamp,
    /// Timestamp when the account was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new account.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewAccount {
    /// University this account is affiliated with.
    pub university_id: Uuid,
    /// Human-readable name for UI and communications.
    pub display_name: String,
    /// Primary email, lowercased before insertion.
    pub email_address: String,
    /// Argon2id hash of the local password, absent for federated accounts.
    pub password_hash: Option<String>,
    /// Email verification status override (defaults to false).
    pub is_verified: Option<bool>,
    /// Identity provider (defaults to self-managed).
    pub provider: Option<AccountProvider>,
    /// Provider-assigned subject id for federated accounts.
    pub provider_subject: Option<String>,
    /// Role names (defaults to the single default role).
    pub roles: Option<Vec<String>>,
}

impl Account {
    /// Returns whether the account may authenticate and refresh credentials.
    pub fn can_login(&self) -> bool {
        self.is_enabled
    }

    /// Returns whether the account holds the administrative role.
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == account::ADMIN_ROLE)
    }

    /// Returns whether the account was provisioned by an external provider.
    pub fn is_federated(&self) -> bool {
        self.provider.is_federated()
    }

    /// Returns whether the account has a usable local password.
    pub fn has_local_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Returns the email domain (the part after `@`).
    pub fn email_domain(&self) -> Option<&str> {
        self.email_address.split_once('@').map(|(_, domain)| domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with_roles(roles: &[&str]) -> Account {
        Account {
            id: Uuid::nil(),
            university_id: Uuid::nil(),
            display_name: "Test".into(),
            email_address: "test@example.edu".into(),
            password_hash: Some("$argon2id$stub".into()),
            is_enabled: true,
            is_verified: false,
            provider: AccountProvider::SelfManaged,
            provider_subject: None,
            roles: roles.iter().map(ToString::to_string).collect(),
            created_at: jiff::Timestamp::UNIX_EPOCH.into(),
            updated_at: jiff::Timestamp::UNIX_EPOCH.into(),
        }
    }

    #[test]
    fn admin_requires_admin_role() {
        assert!(!account_with_roles(&["USER"]).is_admin());
        assert!(account_with_roles(&["USER", "ADMIN"]).is_admin());
    }

    #[test]
    fn disabled_accounts_cannot_login() {
        let mut account = account_with_roles(&["USER"]);
        account.is_enabled = false;
        assert!(!account.can_login());
    }

    #[test]
    fn email_domain_splits_after_at() {
        let account = account_with_roles(&["USER"]);
        assert_eq!(account.email_domain(), Some("example.edu"));
    }
}
