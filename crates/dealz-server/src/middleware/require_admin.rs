//! Administrative role requirement middleware.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::extract::SessionState;

/// Requires the `ADMIN` role to proceed with the request.
///
/// Identity resolution happens first (as in
/// [`require_authentication`](super::require_authentication)); the role
/// check runs against the roles stored on the account row, not the token, so
/// demotions take effect immediately.
pub async fn require_admin(
    session_state: SessionState,
    request: Request,
    next: Next,
) -> Response {
    if let Err(error) = session_state.authorize_admin() {
        return error.into_response();
    }

    next.run(request).await
}
