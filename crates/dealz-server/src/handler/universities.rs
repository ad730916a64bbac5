//! University registry handlers.
//!
//! The public listing backs the institution picker on the registration
//! page; creation is the out-of-band administration surface and requires
//! the `ADMIN` role.

use axum::extract::State;
use axum::http::StatusCode;
use dealz_postgres::PgClient;
use dealz_postgres::model::{NewUniversity, University};
use dealz_postgres::query::UniversityRepository;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use uuid::Uuid;
use validator::Validate;

use crate::extract::{Json, ValidateJson};
use crate::handler::{ErrorResponse, Result};
use crate::service::ServiceState;

/// Tracing target for university registry operations.
const TRACING_TARGET: &str = "dealz_server::handler::universities";

/// One university in API responses.
#[must_use]
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct UniversityResponse {
    /// Unique university identifier.
    pub id: Uuid,
    /// Display name of the institution.
    pub name: String,
    /// Registered email domain.
    pub domain: String,
    /// Human-readable campus location.
    pub location: String,
}

impl From<University> for UniversityResponse {
    fn from(university: University) -> Self {
        Self {
            id: university.id,
            name: university.name,
            domain: university.domain,
            location: university.location,
        }
    }
}

/// Lists all registered universities.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get, path = "/universities/public", tag = "universities",
    responses(
        (status = OK, description = "Registered universities", body = [UniversityResponse]),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse),
    ),
)]
async fn list_public_universities(
    State(pg_client): State<PgClient>,
) -> Result<Json<Vec<UniversityResponse>>> {
    let mut conn = pg_client.get_connection().await?;
    let universities = conn.list_universities().await?;

    Ok(Json(
        universities.into_iter().map(UniversityResponse::from).collect(),
    ))
}

/// Request payload for registering a university.
#[must_use]
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "name": "Example State University",
    "domain": "example.edu",
    "location": "Springfield, US"
}))]
struct CreateUniversityRequest {
    /// Display name of the institution.
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    /// Email domain that gates registration for this institution.
    #[validate(length(min = 3, max = 255))]
    pub domain: String,
    /// Human-readable campus location.
    #[validate(length(min = 2, max = 128))]
    pub location: String,
}

/// Registers a new university (ADMIN only).
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post, path = "/admin/universities", tag = "universities",
    security(("bearer" = [])),
    request_body(content = CreateUniversityRequest, content_type = "application/json"),
    responses(
        (status = CREATED, description = "University registered", body = UniversityResponse),
        (status = BAD_REQUEST, description = "Invalid payload or duplicate domain", body = ErrorResponse),
        (status = UNAUTHORIZED, description = "Missing or invalid credentials", body = ErrorResponse),
        (status = FORBIDDEN, description = "ADMIN role required", body = ErrorResponse),
    ),
)]
async fn create_university(
    State(pg_client): State<PgClient>,
    ValidateJson(request): ValidateJson<CreateUniversityRequest>,
) -> Result<(StatusCode, Json<UniversityResponse>)> {
    let mut conn = pg_client.get_connection().await?;

    let new_university = NewUniversity {
        name: request.name,
        domain: request.domain.to_lowercase(),
        location: request.location,
    };

    let university = conn.create_university(new_university).await?;
    tracing::info!(
        target: TRACING_TARGET,
        university_id = %university.id,
        domain = %university.domain,
        "university registered"
    );

    Ok((StatusCode::CREATED, Json(university.into())))
}

/// Returns a [`Router`] with the public registry routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().routes(routes!(list_public_universities))
}

/// Returns a [`Router`] with the ADMIN-gated registry routes.
///
/// [`Router`]: axum::routing::Router
pub fn admin_routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().routes(routes!(create_university))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handler::test::create_test_server;

    #[tokio::test]
    async fn test_public_listing_includes_seed() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;

        let response = server.get("/universities/public").await;
        response.assert_status_ok();

        let universities: Vec<UniversityResponse> = response.json();
        let seeded = universities
            .iter()
            .find(|u| u.domain == "example.edu")
            .expect("seed university must be listed");

        let mut conn = state.postgres.get_connection().await?;
        assert!(conn.domain_exists("example.edu").await?);
        assert!(!conn.domain_exists("unregistered-domain.example").await?);

        let by_id = conn.find_university_by_id(seeded.id).await?.unwrap();
        assert_eq!(by_id.domain, "example.edu");

        Ok(())
    }

    #[tokio::test]
    async fn test_admin_create_requires_authentication() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;

        let response = server
            .post("/admin/universities")
            .json(&serde_json::json!({
                "name": "Intruder University",
                "domain": "intruder.example",
                "location": "Nowhere"
            }))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        Ok(())
    }
}
