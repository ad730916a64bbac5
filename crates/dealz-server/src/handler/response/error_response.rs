//! Serialized HTTP error body.

use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// HTTP error response representation with security-conscious design.
///
/// This struct contains all the information needed to serialize an error
/// response: the error name, a user-friendly message, and optional resource
/// and context fields.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse<'a> {
    /// The error name/type identifier
    pub name: Cow<'a, str>,
    /// User-friendly error message safe for client display
    pub message: Cow<'a, str>,
    /// The resource that the error relates to (optional, set by handler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Cow<'a, str>>,
    /// Additional context for the failure (optional, set by handler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Cow<'a, str>>,
    /// HTTP status code (not serialized in JSON)
    #[serde(skip)]
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    // 4xx Client Errors
    pub const ACCOUNT_NOT_FOUND: Self = Self::new(
        "account_not_found",
        "No account matches the presented credentials",
        StatusCode::NOT_FOUND,
    );
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "The request could not be processed due to invalid data",
        StatusCode::BAD_REQUEST,
    );
    pub const DUPLICATE_ACCOUNT: Self = Self::new(
        "duplicate_account",
        "An account with this email address already exists",
        StatusCode::CONFLICT,
    );
    pub const EXPIRED_AUTH_TOKEN: Self = Self::new(
        "expired_auth_token",
        "The authentication token has expired",
        StatusCode::UNAUTHORIZED,
    );
    pub const FORBIDDEN: Self = Self::new(
        "forbidden",
        "You don't have permission to access this resource",
        StatusCode::FORBIDDEN,
    );
    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "An internal server error occurred. Please try again later",
        StatusCode::INTERNAL_SERVER_ERROR,
    );
    // Unknown email and wrong password share one message so responses don't
    // reveal whether an account exists.
    pub const INVALID_CREDENTIALS: Self = Self::new(
        "invalid_credentials",
        "Invalid email or password",
        StatusCode::UNAUTHORIZED,
    );
    pub const INVALID_OR_REVOKED_TOKEN: Self = Self::new(
        "invalid_or_revoked_token",
        "The refresh token is invalid or has been revoked",
        StatusCode::UNAUTHORIZED,
    );
    pub const MALFORMED_AUTH_TOKEN: Self = Self::new(
        "malformed_auth_token",
        "The authentication token format is invalid",
        StatusCode::UNAUTHORIZED,
    );
    pub const MISSING_AUTH_TOKEN: Self = Self::new(
        "missing_auth_token",
        "Authentication is required to access this resource",
        StatusCode::UNAUTHORIZED,
    );
    pub const NOT_FOUND: Self = Self::new(
        "not_found",
        "The requested resource was not found",
        StatusCode::NOT_FOUND,
    );
    pub const UNAUTHORIZED: Self = Self::new(
        "unauthorized",
        "Invalid or expired authentication credentials",
        StatusCode::UNAUTHORIZED,
    );
    pub const UNKNOWN_INSTITUTION: Self = Self::new(
        "unknown_institution",
        "No university is registered for this email domain",
        StatusCode::BAD_REQUEST,
    );

    /// Creates a new error response.
    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            context: None,
            status,
        }
    }

    /// Creates a new error response with custom resource.
    /// If a resource already exists, it merges them with a separator.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let new_resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{}/{}", existing, new_resource)),
            None => new_resource,
        });
        self
    }

    /// Creates a new error response with custom message.
    /// Replaces the canned message for this error name.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        self.message = message.into();
        self
    }

    /// Attaches context to the error response.
    /// If context already exists, it merges them with a separator.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let new_context = context.into();
        self.context = Some(match self.context {
            Some(existing) => Cow::Owned(format!("{}; {}", existing, new_context)),
            None => new_context,
        });
        self
    }
}

impl Default for ErrorResponse<'_> {
    #[inline]
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ErrorResponse<'_> {
    #[inline]
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_merging_resource() {
        let response = ErrorResponse::NOT_FOUND
            .with_resource("account")
            .with_resource("credential");

        assert_eq!(response.resource.as_deref(), Some("account/credential"));
    }

    #[test]
    fn error_response_merging_context() {
        let response = ErrorResponse::BAD_REQUEST
            .with_context("first")
            .with_context("second");

        assert_eq!(response.context.as_deref(), Some("first; second"));
    }

    #[test]
    fn custom_message_replaces_canned_message() {
        let response = ErrorResponse::UNAUTHORIZED.with_message("Try using your college email");
        assert_eq!(response.message, "Try using your college email");
    }
}
