//! Bearer token extraction from the Authorization header.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use axum_extra::typed_header::TypedHeaderRejectionReason;

use super::SessionClaims;
use crate::handler::{Error, ErrorKind, Result};
use crate::service::SessionKeys;

/// Bearer token extracted from the standard Authorization header.
///
/// Extraction performs signature and expiry verification only (the codec
/// layer). It deliberately does not consult the credential ledger or the
/// account directory; use [`SessionState`] when full verification is needed.
/// The raw token string is retained because ledger lookups are keyed by the
/// serialized token value.
///
/// [`SessionState`]: crate::extract::SessionState
#[must_use]
#[derive(Debug, Clone)]
pub struct SessionHeader {
    token: String,
    claims: SessionClaims,
}

impl SessionHeader {
    /// Returns the raw serialized token.
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the verified claims.
    #[inline]
    pub const fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    /// Consumes this header and returns its parts.
    #[inline]
    pub fn into_parts(self) -> (String, SessionClaims) {
        (self.token, self.claims)
    }
}

impl<S> FromRequestParts<S> for SessionHeader
where
    S: Sync + Send,
    SessionKeys: FromRef<S>,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| match rejection.reason() {
                    TypedHeaderRejectionReason::Missing => {
                        ErrorKind::MissingAuthToken.into_error()
                    }
                    _ => ErrorKind::MalformedAuthToken.into_error(),
                })?;

        let keys = SessionKeys::from_ref(state);
        let token = header.token().to_owned();
        let claims = SessionClaims::decode(&token, &keys)?;

        Ok(Self { token, claims })
    }
}
