//! JSON extractor with structured rejections.
//!
//! Drop-in replacement for `axum::Json` whose rejection is this crate's
//! [`Error`] type, so malformed bodies produce the same error envelope as
//! every other failure.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use derive_more::{Deref, DerefMut, From};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::handler::{Error, ErrorKind};

/// JSON request/response body.
///
/// Also see [`ValidateJson`] for extraction with automatic validation.
///
/// [`ValidateJson`]: crate::extract::ValidateJson
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Returns the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(from_rejection(rejection)),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    #[inline]
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

fn from_rejection(rejection: JsonRejection) -> Error<'static> {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ErrorKind::BadRequest.with_context("Expected 'application/json' content type")
        }
        JsonRejection::JsonDataError(e) => {
            ErrorKind::BadRequest.with_context(format!("Invalid request body: {}", e.body_text()))
        }
        JsonRejection::JsonSyntaxError(_) => {
            ErrorKind::BadRequest.with_context("Request body is not valid JSON")
        }
        _ => ErrorKind::BadRequest.with_context("Unable to read request body"),
    }
    .into_static()
}
