//! Account profile and administration handlers.

use axum::extract::{Query, State};
use dealz_postgres::PgClient;
use dealz_postgres::model::Account;
use dealz_postgres::query::AccountRepository;
use dealz_postgres::types::{AccountProvider, OffsetPagination};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use uuid::Uuid;

use crate::extract::{Json, SessionState};
use crate::handler::{ErrorResponse, Result};
use crate::service::ServiceState;

/// One account in API responses.
///
/// Password hashes and provider subjects never leave the server.
#[must_use]
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    /// Unique account identifier.
    pub id: Uuid,
    /// University this account is affiliated with.
    pub university_id: Uuid,
    /// Display name of the account.
    pub display_name: String,
    /// Email address of the account.
    pub email_address: String,
    /// Email verification status.
    pub is_verified: bool,
    /// Identity provider the account was provisioned through.
    pub provider: AccountProvider,
    /// Role names.
    pub roles: Vec<String>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            university_id: account.university_id,
            display_name: account.display_name,
            email_address: account.email_address,
            is_verified: account.is_verified,
            provider: account.provider,
            roles: account.roles,
        }
    }
}

/// Returns the authenticated account's profile.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get, path = "/accounts/me", tag = "accounts",
    security(("bearer" = [])),
    responses(
        (status = OK, description = "Authenticated account", body = AccountResponse),
        (status = UNAUTHORIZED, description = "Missing or invalid credentials", body = ErrorResponse),
    ),
)]
async fn current_account(session_state: SessionState) -> Json<AccountResponse> {
    Json(session_state.account().clone().into())
}

/// Pagination query parameters for account listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
struct AccountListParams {
    /// Maximum number of rows to return (1-100).
    #[serde(default)]
    limit: Option<i64>,
    /// Number of rows to skip.
    #[serde(default)]
    offset: Option<i64>,
}

/// Lists accounts, newest first (ADMIN only).
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get, path = "/admin/accounts", tag = "accounts",
    security(("bearer" = [])),
    params(AccountListParams),
    responses(
        (status = OK, description = "Accounts", body = [AccountResponse]),
        (status = UNAUTHORIZED, description = "Missing or invalid credentials", body = ErrorResponse),
        (status = FORBIDDEN, description = "ADMIN role required", body = ErrorResponse),
    ),
)]
async fn list_accounts(
    State(pg_client): State<PgClient>,
    Query(params): Query<AccountListParams>,
) -> Result<Json<Vec<AccountResponse>>> {
    let pagination = OffsetPagination::new(
        params.limit.unwrap_or(OffsetPagination::default().limit),
        params.offset.unwrap_or(0),
    );

    let mut conn = pg_client.get_connection().await?;
    let accounts = conn.list_accounts(pagination).await?;

    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// Returns a [`Router`] with the authenticated account routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().routes(routes!(current_account))
}

/// Returns a [`Router`] with the ADMIN-gated account routes.
///
/// [`Router`]: axum::routing::Router
pub fn admin_routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().routes(routes!(list_accounts))
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;

    use super::*;
    use crate::handler::test::{create_test_server, register_account, unique_email};

    #[tokio::test]
    async fn test_me_requires_token() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;

        let response = server.get("/accounts/me").await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_me_returns_identity() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();
        let credentials = register_account(&server, &email).await;

        let response = server
            .get("/accounts/me")
            .add_header("Authorization", format!("Bearer {}", credentials.access_token))
            .await;
        response.assert_status_ok();

        let body: AccountResponse = response.json();
        assert_eq!(body.email_address, email);
        assert!(body.roles.contains(&"USER".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_me_rejects_refresh_token() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let credentials = register_account(&server, &unique_email()).await;

        // A refresh token must never authorize API calls.
        let response = server
            .get("/accounts/me")
            .add_header("Authorization", format!("Bearer {}", credentials.refresh_token))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_me_rejects_superseded_token() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();
        let credentials = register_account(&server, &email).await;

        // A second login supersedes the first pair.
        server
            .post("/login")
            .json(&serde_json::json!({
                "email": email,
                "password": "SecurePassword123!"
            }))
            .await
            .assert_status_ok();

        let response = server
            .get("/accounts/me")
            .add_header("Authorization", format!("Bearer {}", credentials.access_token))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_admin_listing_forbidden_for_regular_accounts() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let credentials = register_account(&server, &unique_email()).await;

        let response = server
            .get("/admin/accounts")
            .add_header("Authorization", format!("Bearer {}", credentials.access_token))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        Ok(())
    }
}
