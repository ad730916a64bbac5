//! Federated provisioning: account login/creation from an external
//! identity-provider handshake.
//!
//! The callback runs a short pipeline over the asserted identity: validate
//! the email domain against the university registry (a hard 401 gate),
//! resolve the account (login on sight, auto-provision on first sight), and
//! issue credentials exactly as password login does. The initiating request
//! is a browser navigation, so credentials are delivered twice: in the JSON
//! body and as a redirect query parameter to the configured front-end.

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::UserAgent;
use dealz_postgres::model::{Account, NewAccount};
use dealz_postgres::query::{AccountRepository, CredentialRepository, UniversityRepository};
use dealz_postgres::{PgClient, PgConnection};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use uuid::Uuid;

use crate::extract::{ClientAddr, Json};
use crate::handler::authentication::{AuthResponse, mint_credential_pair};
use crate::handler::{ErrorKind, ErrorResponse, Result};
use crate::service::{
    FederatedIdentity, FrontendUrl, GoogleOAuthClient, ServiceState, SessionKeys, TokenPolicy,
};

/// Tracing target for federated provisioning.
const TRACING_TARGET: &str = "dealz_server::handler::federation";

/// Resolves the asserted identity to an account, provisioning on first sight.
///
/// The domain gate fires before any account lookup: unlike
/// self-registration there is no dedicated error taxonomy entry, the caller
/// simply receives an authorization failure.
pub(crate) async fn resolve_federated_account(
    conn: &mut PgConnection,
    identity: &FederatedIdentity,
) -> Result<Account> {
    let domain = identity
        .email
        .split_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or_default();

    let Some(university) = conn.find_university_by_domain(domain).await? else {
        tracing::warn!(
            target: TRACING_TARGET,
            domain = %domain,
            "federated login rejected: no university for domain"
        );
        return Err(ErrorKind::Unauthorized
            .with_message("Try using your college email address")
            .into_static());
    };

    if let Some(account) = conn.find_account_by_email(&identity.email).await? {
        // Known email: treat as a login, never create a duplicate.
        tracing::debug!(
            target: TRACING_TARGET,
            account_id = %account.id,
            "federated login resolved to existing account"
        );
        return Ok(account);
    }

    // First sight: the provider is trusted for email verification, and no
    // local password is stored for federated accounts.
    let new_account = NewAccount {
        university_id: university.id,
        display_name: identity.display_name.clone(),
        email_address: identity.email.clone(),
        password_hash: None,
        is_verified: Some(true),
        provider: Some(identity.provider),
        provider_subject: Some(identity.subject.clone()),
        ..Default::default()
    };

    let account = conn.create_account(new_account).await?;
    tracing::info!(
        target: TRACING_TARGET,
        account_id = %account.id,
        university_id = %university.id,
        provider = %identity.provider,
        "federated account provisioned"
    );

    Ok(account)
}

/// Redirects the browser to the provider's consent screen.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get, path = "/login/oauth2/authorize/google", tag = "federation",
    responses(
        (status = TEMPORARY_REDIRECT, description = "Redirect to the provider consent screen"),
        (status = INTERNAL_SERVER_ERROR, description = "Federation misconfigured", body = ErrorResponse),
    ),
)]
async fn authorize_google(State(google_oauth): State<GoogleOAuthClient>) -> Result<Redirect> {
    let state = Uuid::new_v4().to_string();
    let url = google_oauth.authorize_url(&state).map_err(crate::Error::from)?;

    Ok(Redirect::temporary(url.as_str()))
}

/// Query parameters delivered by the provider callback.
#[derive(Debug, Deserialize, IntoParams)]
struct OAuthCallbackParams {
    /// Authorization code to exchange for provider tokens.
    code: String,
    /// Opaque state echoed back by the provider.
    #[serde(default)]
    #[allow(dead_code)]
    state: Option<String>,
}

/// Completes the external login and issues marketplace credentials.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get, path = "/login/oauth2/code/google", tag = "federation",
    params(OAuthCallbackParams),
    responses(
        (status = FOUND, description = "Credentials issued; redirect to the front-end callback", body = AuthResponse),
        (status = UNAUTHORIZED, description = "Provider handshake failed or domain not registered", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse),
    ),
)]
async fn google_callback(
    State(pg_client): State<PgClient>,
    State(google_oauth): State<GoogleOAuthClient>,
    State(session_keys): State<SessionKeys>,
    State(token_policy): State<TokenPolicy>,
    State(frontend_url): State<FrontendUrl>,
    ClientAddr(ip_address): ClientAddr,
    user_agent: Option<TypedHeader<UserAgent>>,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<Response> {
    // ProviderIdentified: the exchange yields the provider tag, subject,
    // and asserted email.
    let provider_token = google_oauth.exchange_code(&params.code).await?;
    let identity = google_oauth.fetch_identity(&provider_token).await?;

    tracing::debug!(
        target: TRACING_TARGET,
        provider = %identity.provider,
        email = %identity.email,
        "external identity asserted"
    );

    // DomainValidated + AccountResolved.
    let mut conn = pg_client.get_connection().await?;
    let account = resolve_federated_account(&mut conn, &identity).await?;

    // CredentialsIssued: identical to password login, superseding all prior
    // sessions for the account.
    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string()).unwrap_or_default();
    let new_pair =
        mint_credential_pair(&session_keys, token_policy, &account, ip_address, user_agent)?;
    let pair = conn.issue_credential_pair(new_pair).await?;

    tracing::info!(
        target: TRACING_TARGET,
        account_id = %account.id,
        credential_id = %pair.id,
        "federated login successful: credential pair recorded"
    );

    let callback_url = frontend_url.oauth_callback(&pair.access_token);
    let location = HeaderValue::from_str(callback_url.as_str()).map_err(|e| {
        ErrorKind::InternalServerError
            .with_message("Invalid front-end redirect URL")
            .with_context(e.to_string())
            .into_static()
    })?;

    // Dual delivery: JSON body for API-shaped callers plus a redirect for
    // the browser navigation that initiated the flow.
    let body = AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        message: "Login was successful".to_string(),
    };

    let mut response = (StatusCode::FOUND, Json(body)).into_response();
    response.headers_mut().insert(header::LOCATION, location);

    Ok(response)
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new()
        .routes(routes!(authorize_google))
        .routes(routes!(google_callback))
}

#[cfg(test)]
mod test {
    use dealz_postgres::query::CredentialRepository;
    use dealz_postgres::types::AccountProvider;

    use super::*;
    use crate::handler::test::{create_test_server, unique_email};

    fn test_identity(email: &str) -> FederatedIdentity {
        FederatedIdentity {
            provider: AccountProvider::Google,
            subject: Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: "Fede Rated".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_sight_provisions_verified_account() -> anyhow::Result<()> {
        let (_server, state) = create_test_server().await?;
        let email = unique_email();
        let identity = test_identity(&email);

        let mut conn = state.postgres.get_connection().await?;
        let account = resolve_federated_account(&mut conn, &identity).await?;

        assert_eq!(account.email_address, email);
        assert!(account.is_verified);
        assert!(account.is_enabled);
        assert!(account.is_federated());
        assert!(!account.has_local_password());
        assert_eq!(account.provider_subject.as_deref(), Some(identity.subject.as_str()));
        assert!(account.roles.contains(&"USER".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_second_sight_reuses_account() -> anyhow::Result<()> {
        let (_server, state) = create_test_server().await?;
        let email = unique_email();
        let identity = test_identity(&email);

        let mut conn = state.postgres.get_connection().await?;
        let first = resolve_federated_account(&mut conn, &identity).await?;
        let second = resolve_federated_account(&mut conn, &identity).await?;

        assert_eq!(first.id, second.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_domain_is_rejected_without_account() -> anyhow::Result<()> {
        let (_server, state) = create_test_server().await?;
        let identity = test_identity("someone@unregistered-domain.example");

        let mut conn = state.postgres.get_connection().await?;
        let error = resolve_federated_account(&mut conn, &identity)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Unauthorized);
        assert!(!conn.email_exists(&identity.email).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_existing_password_account_logs_in_federated() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;
        let email = unique_email();

        // Self-registered first; the federated login must reuse the row.
        server
            .post("/register")
            .json(&serde_json::json!({
                "name": "Password First",
                "email": email,
                "password": "SecurePassword123!"
            }))
            .await;

        let mut conn = state.postgres.get_connection().await?;
        let account = resolve_federated_account(&mut conn, &test_identity(&email)).await?;

        assert!(account.has_local_password());
        assert_eq!(account.provider, AccountProvider::SelfManaged);

        Ok(())
    }

    #[tokio::test]
    async fn test_federated_issue_supersedes_prior_pairs() -> anyhow::Result<()> {
        let (_server, state) = create_test_server().await?;
        let email = unique_email();
        let identity = test_identity(&email);

        let mut conn = state.postgres.get_connection().await?;
        let account = resolve_federated_account(&mut conn, &identity).await?;

        for _ in 0..2 {
            let new_pair = mint_credential_pair(
                &state.session_keys,
                state.token_policy,
                &account,
                "127.0.0.1/32".parse().unwrap(),
                String::new(),
            )?;
            conn.issue_credential_pair(new_pair).await?;
        }

        let pairs = conn.list_account_credentials(account.id).await?;
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs.iter().filter(|pair| pair.is_active()).count(), 1);

        Ok(())
    }
}
