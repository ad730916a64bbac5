//! Authentication requirement middleware.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::extract::SessionState;

/// Requires a fully verified identity to proceed with the request.
///
/// Extraction of [`SessionState`] performs the whole gate: codec
/// verification, ledger activity check, and account resolution. The verified
/// state is cached in request extensions, so handlers extracting it again do
/// not repeat the database work.
pub async fn require_authentication(
    _session_state: SessionState,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}
