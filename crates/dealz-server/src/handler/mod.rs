//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! Route classification mirrors the security configuration of the HTTP
//! surface: authentication, federation, the public university directory,
//! health, and the WebSocket upgrade are public; everything else requires a
//! verified bearer token; `/admin/**` additionally requires the `ADMIN`
//! role.
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod accounts;
pub(crate) mod authentication;
mod error;
mod federation;
mod monitors;
mod response;
mod universities;
mod websocket;

use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use utoipa_axum::router::OpenApiRouter;

pub use crate::handler::error::{Error, ErrorKind, Result};
pub(crate) use crate::handler::response::ErrorResponse;
use crate::middleware::{require_admin, require_authentication};
use crate::service::ServiceState;

#[inline]
async fn fallback() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Returns an [`OpenApiRouter`] with all public routes.
fn public_routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new()
        .merge(authentication::routes())
        .merge(federation::routes())
        .merge(universities::routes())
        .merge(monitors::routes())
        .merge(websocket::routes())
}

/// Returns an [`OpenApiRouter`] with all authenticated routes.
fn private_routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().merge(accounts::routes())
}

/// Returns an [`OpenApiRouter`] with all ADMIN-gated routes.
fn admin_routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new()
        .merge(accounts::admin_routes())
        .merge(universities::admin_routes())
}

/// Returns an [`OpenApiRouter`] with all routes.
pub fn api_routes(state: ServiceState) -> OpenApiRouter<ServiceState> {
    let require_authentication = from_fn_with_state(state.clone(), require_authentication);
    let require_admin = from_fn_with_state(state, require_admin);

    let private_router = private_routes().route_layer(require_authentication);
    let admin_router = admin_routes().route_layer(require_admin);

    OpenApiRouter::new()
        .merge(public_routes())
        .merge(private_router)
        .merge(admin_router)
        .fallback(fallback)
}

#[cfg(test)]
pub(crate) mod test {
    use axum_test::TestServer;
    use uuid::Uuid;

    use crate::handler::api_routes;
    use crate::handler::authentication::AuthResponse;
    use crate::service::{ServiceConfig, ServiceState};

    /// Password used by every test account.
    pub const TEST_PASSWORD: &str = "SecurePassword123!";

    /// Returns a unique email under the seeded development domain.
    pub fn unique_email() -> String {
        format!("user-{}@example.edu", Uuid::new_v4().simple())
    }

    /// Returns a new [`TestServer`] with the full router and its state.
    ///
    /// Requires the development Postgres and NATS endpoints from the default
    /// configuration (override via environment for CI).
    pub async fn create_test_server() -> anyhow::Result<(TestServer, ServiceState)> {
        dotenvy::dotenv().ok();

        let mut builder = ServiceConfig::builder();
        if let Ok(endpoint) = std::env::var("POSTGRES_URL") {
            builder = builder.with_postgres_endpoint(endpoint);
        }
        if let Ok(url) = std::env::var("NATS_URL") {
            builder = builder.with_nats_url(url);
        }

        let config = builder.build()?;
        let state = ServiceState::from_config(&config).await?;

        let router = api_routes(state.clone()).with_state(state.clone());
        let (app, _api) = router.split_for_parts();
        let server = TestServer::new(app)?;

        Ok((server, state))
    }

    /// Registers a fresh account and returns its credentials.
    pub async fn register_account(server: &TestServer, email: &str) -> AuthResponse {
        let response = server
            .post("/register")
            .json(&serde_json::json!({
                "name": "Test User",
                "email": email,
                "password": TEST_PASSWORD,
            }))
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }

    #[tokio::test]
    async fn handlers() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let response = server.get("/this-route-does-not-exist").await;
        response.assert_status_not_found();
        Ok(())
    }
}
