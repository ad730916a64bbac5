//! Health monitoring handlers.

use axum::extract::State;
use dealz_nats::NatsClient;
use dealz_postgres::PgClient;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::extract::Json;
use crate::service::ServiceState;

/// Service health report.
#[must_use]
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    /// Overall status: `ok` when every dependency responds.
    pub status: String,
    /// Postgres connectivity.
    pub postgres: bool,
    /// NATS connectivity.
    pub nats: bool,
}

/// Reports liveness of the service and its backing dependencies.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get, path = "/health", tag = "monitors",
    responses(
        (status = OK, description = "Health report", body = HealthResponse),
    ),
)]
async fn health(
    State(pg_client): State<PgClient>,
    State(nats_client): State<NatsClient>,
) -> Json<HealthResponse> {
    let postgres = pg_client.ping().await.is_ok();
    let nats = nats_client.ping().await.is_ok();

    let status = if postgres && nats { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        postgres,
        nats,
    })
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().routes(routes!(health))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handler::test::create_test_server;

    #[tokio::test]
    async fn test_health_reports_ok() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;

        let response = server.get("/health").await;
        response.assert_status_ok();

        let body: HealthResponse = response.json();
        assert_eq!(body.status, "ok");
        assert!(body.postgres);
        assert!(body.nats);

        Ok(())
    }
}
