//! HTTP error handling with builder pattern for dynamic error responses.
//!
//! This module provides HTTP error handling with a builder pattern that
//! allows for dynamic error messages and resource-specific context.

use std::borrow::Cow;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dealz_postgres::PgError;
use dealz_postgres::types::ConstraintViolation;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use validator::ValidationErrors;

use crate::handler::response::ErrorResponse;

/// The error type for HTTP handlers in the server.
///
/// This error type provides a way to handle HTTP errors with proper status
/// codes, messages, and optional context information.
#[derive(Clone)]
#[must_use = "errors do nothing unless serialized"]
pub struct Error<'a> {
    kind: ErrorKind,
    context: Option<Cow<'a, str>>,
    message: Option<Cow<'a, str>>,
    resource: Option<Cow<'a, str>>,
}

impl Error<'static> {
    /// Creates a new [`Error`] with the specified kind.
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            message: None,
            resource: None,
        }
    }
}

impl<'a> Error<'a> {
    /// Attaches context information to the error.
    #[inline]
    pub fn with_context(self, context: impl Into<Cow<'a, str>>) -> Self {
        Self {
            context: Some(context.into()),
            ..self
        }
    }

    /// Sets a custom user-friendly message for the error.
    #[inline]
    pub fn with_message(self, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    /// Sets the resource that caused the error.
    #[inline]
    pub fn with_resource(self, resource: impl Into<Cow<'a, str>>) -> Self {
        Self {
            resource: Some(resource.into()),
            ..self
        }
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context if present.
    #[inline]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the custom message if present.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the resource if present.
    #[inline]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Converts this error into a static version by cloning all borrowed data.
    pub fn into_static(self) -> Error<'static> {
        Error {
            kind: self.kind,
            context: self.context.map(|c| Cow::Owned(c.into_owned())),
            message: self.message.map(|m| Cow::Owned(m.into_owned())),
            resource: self.resource.map(|r| Cow::Owned(r.into_owned())),
        }
    }
}

impl Default for Error<'static> {
    #[inline]
    fn default() -> Self {
        Self::new(ErrorKind::default())
    }
}

impl fmt::Debug for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.kind.response();

        let mut debug_struct = f.debug_struct("Error");
        debug_struct
            .field("kind", &self.kind)
            .field("name", &response.name)
            .field("status", &response.status);

        if let Some(ref context) = self.context {
            debug_struct.field("context", context);
        }

        if let Some(ref message) = self.message {
            debug_struct.field("custom_message", message);
        }

        if let Some(ref resource) = self.resource {
            debug_struct.field("custom_resource", resource);
        }

        debug_struct.finish()
    }
}

impl fmt::Display for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.kind.response();
        let message = self.message.as_deref().unwrap_or(response.message.as_ref());

        write!(f, "{} ({}): {}", response.name, response.status, message)?;

        if let Some(ref context) = self.context {
            write!(f, " - {}", context)?;
        }

        if let Some(ref resource) = self.resource {
            write!(f, " [resource: {}]", resource)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error<'_> {}

impl IntoResponse for Error<'_> {
    fn into_response(self) -> Response {
        let mut response = self.kind.response();

        if let Some(message) = self.message {
            response = response.with_message(message);
        }

        if let Some(resource) = self.resource {
            response = response.with_resource(resource);
        }

        if let Some(context) = self.context {
            response = response.with_context(context);
        }

        response.into_response()
    }
}

impl From<ErrorKind> for Error<'static> {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<PgError> for Error<'static> {
    fn from(error: PgError) -> Self {
        match &error {
            // The rotation loser must surface the refresh-specific error,
            // not a generic failure.
            PgError::StaleCredential => ErrorKind::InvalidOrRevokedToken.into_error(),
            _ => match error.constraint_violation() {
                Some(ConstraintViolation::AccountEmailTaken) => {
                    ErrorKind::DuplicateAccount.into_error()
                }
                Some(ConstraintViolation::UniversityDomainTaken) => ErrorKind::BadRequest
                    .with_message("A university with this domain is already registered"),
                _ => {
                    tracing::error!(error = %error, "database operation failed");
                    ErrorKind::InternalServerError.into_error()
                }
            },
        }
    }
}

impl From<JwtError> for Error<'static> {
    fn from(error: JwtError) -> Self {
        match error.kind() {
            JwtErrorKind::ExpiredSignature => ErrorKind::ExpiredAuthToken.into_error(),
            JwtErrorKind::InvalidSignature
            | JwtErrorKind::InvalidIssuer
            | JwtErrorKind::InvalidAudience
            | JwtErrorKind::ImmatureSignature => ErrorKind::Unauthorized.into_error(),
            _ => ErrorKind::MalformedAuthToken.into_error(),
        }
    }
}

impl From<ValidationErrors> for Error<'static> {
    fn from(errors: ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<&str> = field_errors.keys().map(|k| k.as_ref()).collect();
        fields.sort_unstable();

        ErrorKind::BadRequest
            .with_context(format!("Validation failed for: {}", fields.join(", ")))
            .into_static()
    }
}

/// A specialized [`Result`] type for HTTP operations.
///
/// [`Result`]: std::result::Result
pub type Result<T, E = Error<'static>> = std::result::Result<T, E>;

/// Enumeration of all possible HTTP error kinds.
///
/// Each variant corresponds to a specific HTTP status code and error
/// scenario; domain-specific authentication failures get their own variants
/// so handlers never need to build them from scratch.
#[must_use = "error kinds do nothing unless used to create errors"]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // 4xx Client Errors
    /// 400 Bad Request - Invalid request data
    BadRequest,
    /// 400 Bad Request - No institution registered for the email domain
    UnknownInstitution,
    /// 401 Unauthorized - Missing authentication token
    MissingAuthToken,
    /// 401 Unauthorized - Malformed authentication token
    MalformedAuthToken,
    /// 401 Unauthorized - Expired authentication token
    ExpiredAuthToken,
    /// 401 Unauthorized - Unknown email or wrong password (deliberately conflated)
    InvalidCredentials,
    /// 401 Unauthorized - Refresh token unknown, revoked, or superseded
    InvalidOrRevokedToken,
    /// 401 Unauthorized - Invalid or revoked credentials
    Unauthorized,
    /// 403 Forbidden - Access denied
    Forbidden,
    /// 404 Not Found - Resource not found
    NotFound,
    /// 404 Not Found - Token subject has no matching account
    AccountNotFound,
    /// 409 Conflict - An account with this email already exists
    DuplicateAccount,

    // 5xx Server Errors
    /// 500 Internal Server Error - Unexpected server error
    #[default]
    InternalServerError,
}

impl ErrorKind {
    /// Converts this error kind into a full [`Error`].
    #[inline]
    pub fn into_error(self) -> Error<'static> {
        Error::new(self)
    }

    /// Creates an [`Error`] with the specified context.
    #[inline]
    pub fn with_context<'a>(self, context: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_context(context)
    }

    /// Creates an [`Error`] with the specified message.
    #[inline]
    pub fn with_message<'a>(self, message: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_message(message)
    }

    /// Creates an [`Error`] with the specified resource.
    #[inline]
    pub fn with_resource<'a>(self, resource: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_resource(resource)
    }

    /// Returns the HTTP status code for this error kind.
    #[inline]
    pub fn status_code(self) -> StatusCode {
        self.response().status
    }

    /// Returns the internal representation of this error kind.
    #[inline]
    pub fn response(self) -> ErrorResponse<'static> {
        match self {
            Self::BadRequest => ErrorResponse::BAD_REQUEST,
            Self::UnknownInstitution => ErrorResponse::UNKNOWN_INSTITUTION,
            Self::MissingAuthToken => ErrorResponse::MISSING_AUTH_TOKEN,
            Self::MalformedAuthToken => ErrorResponse::MALFORMED_AUTH_TOKEN,
            Self::ExpiredAuthToken => ErrorResponse::EXPIRED_AUTH_TOKEN,
            Self::InvalidCredentials => ErrorResponse::INVALID_CREDENTIALS,
            Self::InvalidOrRevokedToken => ErrorResponse::INVALID_OR_REVOKED_TOKEN,
            Self::Unauthorized => ErrorResponse::UNAUTHORIZED,
            Self::Forbidden => ErrorResponse::FORBIDDEN,
            Self::NotFound => ErrorResponse::NOT_FOUND,
            Self::AccountNotFound => ErrorResponse::ACCOUNT_NOT_FOUND,
            Self::DuplicateAccount => ErrorResponse::DUPLICATE_ACCOUNT,
            Self::InternalServerError => ErrorResponse::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.response().name.as_ref())
    }
}

impl IntoResponse for ErrorKind {
    #[inline]
    fn into_response(self) -> Response {
        self.response().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_http_error() {
        let error = Error::default();
        assert_eq!(error.kind(), ErrorKind::InternalServerError);
        let _ = error.into_response();
    }

    #[test]
    fn error_builder_chaining() {
        let error = ErrorKind::NotFound
            .with_message("University not found")
            .with_resource("university")
            .with_context("domain: example.edu");

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.message(), Some("University not found"));
        assert_eq!(error.resource(), Some("university"));
        assert_eq!(error.context(), Some("domain: example.edu"));
    }

    #[test]
    fn stale_credential_maps_to_invalid_or_revoked() {
        let error: Error = PgError::StaleCredential.into();
        assert_eq!(error.kind(), ErrorKind::InvalidOrRevokedToken);
        assert_eq!(error.kind().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_jwt_maps_to_expired_auth_token() {
        let error: Error = JwtError::from(JwtErrorKind::ExpiredSignature).into();
        assert_eq!(error.kind(), ErrorKind::ExpiredAuthToken);
    }

    #[test]
    fn invalid_signature_maps_to_unauthorized() {
        let error: Error = JwtError::from(JwtErrorKind::InvalidSignature).into();
        assert_eq!(error.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn garbage_jwt_maps_to_malformed() {
        let error: Error = JwtError::from(JwtErrorKind::InvalidToken).into();
        assert_eq!(error.kind(), ErrorKind::MalformedAuthToken);
    }

    #[test]
    fn all_error_kinds_have_responses() {
        let kinds = vec![
            ErrorKind::BadRequest,
            ErrorKind::UnknownInstitution,
            ErrorKind::MissingAuthToken,
            ErrorKind::MalformedAuthToken,
            ErrorKind::ExpiredAuthToken,
            ErrorKind::InvalidCredentials,
            ErrorKind::InvalidOrRevokedToken,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
            ErrorKind::AccountNotFound,
            ErrorKind::DuplicateAccount,
            ErrorKind::InternalServerError,
        ];

        for kind in kinds {
            let response = kind.response();
            assert!(!response.name.is_empty());
            assert!(response.status.as_u16() >= 400);
            let _ = kind.into_response();
        }
    }

    #[test]
    fn conflated_credentials_message_does_not_mention_email_existence() {
        let response = ErrorKind::InvalidCredentials.response();
        assert!(!response.message.contains("exist"));
        assert!(!response.message.contains("unknown"));
    }
}
