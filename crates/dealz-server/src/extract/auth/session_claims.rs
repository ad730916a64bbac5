//! Signed credential token claims.
//!
//! This is the credential codec: it mints and verifies the self-contained
//! signed tokens carried in Authorization headers and WebSocket connect
//! frames. Tokens are JWTs (three dot-separated base64url segments) signed
//! with HMAC-SHA-256; access and refresh tokens share the structure and are
//! distinguished by an explicit `kind` claim that every verification site
//! checks, so a long-lived refresh token can never pass where an access
//! token is required.

use std::borrow::Cow;

use dealz_postgres::model::Account;
use jiff::{Span, Timestamp};
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TRACING_TARGET_AUTHENTICATION;
use crate::handler::{ErrorKind, Result};
use crate::service::SessionKeys;

/// Discriminator claim separating the two token flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer credential authorizing API calls.
    Access,
    /// Longer-lived credential used solely to mint a new pair.
    Refresh,
}

impl TokenKind {
    /// Returns whether this is an access token.
    #[inline]
    #[must_use]
    pub fn is_access(self) -> bool {
        matches!(self, Self::Access)
    }

    /// Returns whether this is a refresh token.
    #[inline]
    #[must_use]
    pub fn is_refresh(self) -> bool {
        matches!(self, Self::Refresh)
    }
}

/// Claims carried by every signed credential token.
///
/// Timestamps are serialized as integer Unix seconds per RFC 7519.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer (who created the token).
    #[serde(rename = "iss")]
    issued_by: Cow<'static, str>,
    /// Unique token id. Guarantees distinct serialized tokens even when two
    /// pairs are minted for the same account within one second.
    #[serde(rename = "jti")]
    pub token_id: Uuid,
    /// Subject: the account email, which doubles as the external username.
    #[serde(rename = "sub")]
    pub subject: String,
    /// Email claim, mirroring the subject.
    pub email: String,
    /// Access/refresh discriminator.
    pub kind: TokenKind,
    /// Issued at (Unix seconds).
    #[serde(rename = "iat", with = "jiff::fmt::serde::timestamp::second::required")]
    pub issued_at: Timestamp,
    /// Expiration time (Unix seconds).
    #[serde(rename = "exp", with = "jiff::fmt::serde::timestamp::second::required")]
    pub expires_at: Timestamp,
}

impl SessionClaims {
    /// Issuer identifier for all credential tokens.
    const JWT_ISSUER: &'static str = "dealz";

    /// Creates claims for an account with the given kind and lifetime.
    ///
    /// Issued-at is the current time; expiry is issued-at plus `ttl`.
    pub fn new(account: &Account, kind: TokenKind, ttl: Span) -> Result<Self> {
        let issued_at = Timestamp::now();
        let expires_at = issued_at.checked_add(ttl).map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_AUTHENTICATION,
                error = %e,
                "token lifetime overflows representable time"
            );
            ErrorKind::InternalServerError
                .with_message("Credential generation failed")
                .into_static()
        })?;

        Ok(Self {
            issued_by: Cow::Borrowed(Self::JWT_ISSUER),
            token_id: Uuid::new_v4(),
            subject: account.email_address.clone(),
            email: account.email_address.clone(),
            kind,
            issued_at,
            expires_at,
        })
    }

    /// Signs these claims into a compact token string.
    pub fn encode(&self, keys: &SessionKeys) -> Result<String> {
        let header = Header::new(Algorithm::HS256);

        encode(&header, self, keys.encoding_key()).map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_AUTHENTICATION,
                error = %e,
                subject = %self.subject,
                "failed to sign credential token"
            );

            ErrorKind::InternalServerError
                .with_message("Credential generation failed")
                .into_static()
        })
    }

    /// Parses and verifies a token string.
    ///
    /// Verification covers signature, issuer, required claims, and expiry,
    /// and is side-effect-free. Failures map to `MalformedAuthToken`
    /// (unparseable), `Unauthorized` (bad signature or issuer), and
    /// `ExpiredAuthToken`.
    pub fn decode(token: &str, keys: &SessionKeys) -> Result<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[Self::JWT_ISSUER]);
        validation.set_required_spec_claims(&["iss", "sub", "iat", "exp"]);

        let token_data = decode::<Self>(token, keys.decoding_key(), &validation)?;
        let claims = token_data.claims;

        // jsonwebtoken already validated `exp`, but with integer-second
        // truncation a token minted with ttl=0 can pass for under a second.
        if claims.is_expired() {
            tracing::debug!(
                target: TRACING_TARGET_AUTHENTICATION,
                subject = %claims.subject,
                expired_at = %claims.expires_at,
                "credential token expired"
            );
            return Err(ErrorKind::ExpiredAuthToken.into_error());
        }

        Ok(claims)
    }

    /// Checks if the token has expired based on current UTC time.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Timestamp::now()
    }

    /// Requires the access kind, as every API-call verification site does.
    pub fn require_access(&self) -> Result<()> {
        if self.kind.is_access() {
            Ok(())
        } else {
            tracing::warn!(
                target: TRACING_TARGET_AUTHENTICATION,
                subject = %self.subject,
                "refresh token presented where an access token is required"
            );
            Err(ErrorKind::Unauthorized
                .with_message("This token cannot be used to authorize requests")
                .into_static())
        }
    }
}

#[cfg(test)]
mod tests {
    use dealz_postgres::types::AccountProvider;

    use super::*;

    fn test_keys() -> SessionKeys {
        use base64::Engine as _;
        let secret = base64::engine::general_purpose::STANDARD.encode([0x17; 32]);
        SessionKeys::from_base64(&secret).unwrap()
    }

    fn test_account() -> Account {
        Account {
            id: Uuid::new_v4(),
            university_id: Uuid::new_v4(),
            display_name: "Alice".into(),
            email_address: "alice@school.edu".into(),
            password_hash: None,
            is_enabled: true,
            is_verified: true,
            provider: AccountProvider::SelfManaged,
            provider_subject: None,
            roles: vec!["USER".into()],
            created_at: jiff::Timestamp::UNIX_EPOCH.into(),
            updated_at: jiff::Timestamp::UNIX_EPOCH.into(),
        }
    }

    #[test]
    fn mint_verify_round_trip() {
        let keys = test_keys();
        let claims =
            SessionClaims::new(&test_account(), TokenKind::Access, Span::new().minutes(15))
                .unwrap();

        let token = claims.encode(&keys).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = SessionClaims::decode(&token, &keys).unwrap();
        assert_eq!(decoded.subject, "alice@school.edu");
        assert_eq!(decoded.email, "alice@school.edu");
        assert_eq!(decoded.kind, TokenKind::Access);
    }

    #[test]
    fn zero_ttl_token_fails_expired() {
        let keys = test_keys();
        let claims =
            SessionClaims::new(&test_account(), TokenKind::Access, Span::new()).unwrap();
        let token = claims.encode(&keys).unwrap();

        let error = SessionClaims::decode(&token, &keys).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::ExpiredAuthToken);
    }

    #[test]
    fn tampered_token_fails_verification() {
        let keys = test_keys();
        let claims =
            SessionClaims::new(&test_account(), TokenKind::Access, Span::new().minutes(15))
                .unwrap();
        let token = claims.encode(&keys).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

        assert!(SessionClaims::decode(&tampered, &keys).is_err());
    }

    #[test]
    fn garbage_fails_as_malformed() {
        let keys = test_keys();
        let error = SessionClaims::decode("not-a-token", &keys).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::MalformedAuthToken);
    }

    #[test]
    fn wrong_key_fails_verification() {
        use base64::Engine as _;
        let keys = test_keys();
        let other_secret = base64::engine::general_purpose::STANDARD.encode([0x99; 32]);
        let other_keys = SessionKeys::from_base64(&other_secret).unwrap();

        let claims =
            SessionClaims::new(&test_account(), TokenKind::Access, Span::new().minutes(15))
                .unwrap();
        let token = claims.encode(&keys).unwrap();

        let error = SessionClaims::decode(&token, &other_keys).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Unauthorized);
    }

    #[test]
    fn refresh_token_rejected_where_access_required() {
        let keys = test_keys();
        let claims =
            SessionClaims::new(&test_account(), TokenKind::Refresh, Span::new().days(7))
                .unwrap();
        let token = claims.encode(&keys).unwrap();

        let decoded = SessionClaims::decode(&token, &keys).unwrap();
        assert!(decoded.kind.is_refresh());
        assert!(decoded.require_access().is_err());
    }
}
