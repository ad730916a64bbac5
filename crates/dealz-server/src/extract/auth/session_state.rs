//! Fully verified identity extraction.
//!
//! [`SessionState`] is the request authentication gate: beyond the codec
//! checks performed by [`SessionHeader`], it confirms the presented access
//! token is still active in the credential ledger, resolves the owning
//! account, and attaches identity and roles to the request. Verification is
//! read-only; this extractor never mutates the ledger.

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use dealz_postgres::PgClient;
use dealz_postgres::model::Account;
use dealz_postgres::query::{AccountRepository, CredentialRepository};
use uuid::Uuid;

use super::{SessionClaims, SessionHeader};
use crate::TRACING_TARGET_AUTHENTICATION;
use crate::handler::{Error, ErrorKind, Result};
use crate::service::SessionKeys;

/// Authenticated identity with ledger and directory verification.
///
/// When extraction succeeds the caller holds a cryptographically valid,
/// unexpired, unrevoked access token belonging to an enabled account. The
/// verified state is cached in request extensions so later extractors in the
/// same request skip the database round-trips.
#[derive(Debug, Clone)]
pub struct SessionState {
    account: Account,
    claims: SessionClaims,
}

impl SessionState {
    /// Verifies a codec-validated token against the ledger and directory.
    pub async fn from_session_header(
        session_header: SessionHeader,
        pg_client: PgClient,
    ) -> Result<Self> {
        let (token, claims) = session_header.into_parts();

        // A refresh token never authorizes API calls.
        claims.require_access()?;

        let mut conn = pg_client.get_connection().await.map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_AUTHENTICATION,
                error = %e,
                subject = %claims.subject,
                "database unavailable during authentication verification"
            );
            ErrorKind::InternalServerError
                .with_message("Authentication verification is temporarily unavailable")
                .into_static()
        })?;

        // Revocation is effective immediately, independent of token expiry.
        if !conn.is_access_token_active(&token).await? {
            tracing::warn!(
                target: TRACING_TARGET_AUTHENTICATION,
                subject = %claims.subject,
                "access token not active in credential ledger"
            );
            return Err(ErrorKind::Unauthorized
                .with_message("This session has been revoked")
                .into_static());
        }

        let account = conn
            .find_account_by_email(&claims.subject)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    target: TRACING_TARGET_AUTHENTICATION,
                    subject = %claims.subject,
                    "token subject has no matching account"
                );
                ErrorKind::Unauthorized.into_error()
            })?;

        if !account.can_login() {
            tracing::warn!(
                target: TRACING_TARGET_AUTHENTICATION,
                account_id = %account.id,
                "disabled account presented a valid token"
            );
            return Err(ErrorKind::Unauthorized.into_error());
        }

        Ok(Self { account, claims })
    }

    /// Returns the authenticated account.
    #[inline]
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Returns the verified claims.
    #[inline]
    pub const fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    /// Returns the authenticated account's id.
    #[inline]
    pub fn account_id(&self) -> Uuid {
        self.account.id
    }

    /// Returns the authenticated account's email.
    #[inline]
    pub fn email(&self) -> &str {
        &self.account.email_address
    }

    /// Returns whether the account holds the administrative role.
    #[inline]
    pub fn is_admin(&self) -> bool {
        self.account.is_admin()
    }

    /// Requires the administrative role.
    pub fn authorize_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ErrorKind::Forbidden.into_error())
        }
    }
}

impl<S> FromRequestParts<S> for SessionState
where
    S: Sync + Send + 'static,
    PgClient: FromRef<S>,
    SessionKeys: FromRef<S>,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Cached verification from an earlier extractor in this request.
        if let Some(session_state) = parts.extensions.get::<Self>() {
            return Ok(session_state.clone());
        }

        let session_header = SessionHeader::from_request_parts(parts, state).await?;
        let pg_client = PgClient::from_ref(state);
        let session_state = Self::from_session_header(session_header, pg_client).await?;

        parts.extensions.insert(session_state.clone());
        Ok(session_state)
    }
}

impl<S> OptionalFromRequestParts<S> for SessionState
where
    S: Sync + Send + 'static,
    PgClient: FromRef<S>,
    SessionKeys: FromRef<S>,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <Self as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(session_state) => Ok(Some(session_state)),
            Err(_) => Ok(None),
        }
    }
}
