//! Credential pair model for the session ledger.

use diesel::prelude::*;
use ipnet::IpNet;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::credential_pairs;

/// One issued access/refresh token pair.
///
/// A row is written for every successful login, refresh, and federated
/// provisioning event. Rows are revoked, never un-revoked and never deleted
/// by normal flow, so the table is also the session audit trail.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = credential_pairs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CredentialPair {
    /// Unique ledger row identifier.
    pub id: Uuid,
    /// Account this pair belongs to.
    pub account_id: Uuid,
    /// Serialized signed access token.
    pub access_token: String,
    /// Serialized signed refresh token.
    pub refresh_token: String,
    /// Revocation flag; set when a newer pair supersedes this one.
    pub is_revoked: bool,
    /// IP address the issuing request originated from.
    pub ip_address: IpNet,
    /// User agent string of the issuing client.
    pub user_agent: String,
    /// Timestamp of issuance.
    pub issued_at: Timestamp,
}

/// Data for recording a new credential pair.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credential_pairs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewCredentialPair {
    /// Account this pair belongs to.
    pub account_id: Uuid,
    /// Serialized signed access token.
    pub access_token: String,
    /// Serialized signed refresh token.
    pub refresh_token: String,
    /// IP address the issuing request originated from.
    pub ip_address: IpNet,
    /// User agent string of the issuing client.
    pub user_agent: String,
}

impl CredentialPair {
    /// Returns whether this pair is still usable.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.is_revoked
    }

    /// Returns a shortened prefix of the access token for logging.
    pub fn access_token_short(&self) -> &str {
        let end = self
            .access_token
            .char_indices()
            .nth(12)
            .map_or(self.access_token.len(), |(i, _)| i);
        &self.access_token[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_token_is_a_prefix() {
        let pair = CredentialPair {
            id: Uuid::nil(),
            account_id: Uuid::nil(),
            access_token: "header.payload.signature".into(),
            refresh_token: "header.payload.signature2".into(),
            is_revoked: false,
            ip_address: "127.0.0.1/32".parse().unwrap(),
            user_agent: "test".into(),
            issued_at: jiff::Timestamp::UNIX_EPOCH.into(),
        };

        assert_eq!(pair.access_token_short(), "header.paylo");
        assert!(pair.is_active());
    }
}
