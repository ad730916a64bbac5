//! Authentication handlers for registration, login, and credential refresh.
//!
//! All three operations terminate in the credential ledger: registration
//! records the first pair, login and refresh record a replacement pair in
//! the same transaction that revokes every prior pair for the account, so
//! at most one pair per account is ever active.

use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::TypedHeader;
use axum_extra::headers::UserAgent;
use dealz_postgres::PgClient;
use dealz_postgres::model::{Account, NewAccount, NewCredentialPair};
use dealz_postgres::query::{AccountRepository, CredentialRepository, UniversityRepository};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use validator::Validate;

use crate::extract::{ClientAddr, Json, SessionClaims, SessionHeader, TokenKind, ValidateJson};
use crate::handler::{ErrorKind, ErrorResponse, Result};
use crate::service::{PasswordHasher, ServiceState, SessionKeys, TokenPolicy};

/// Tracing target for authentication operations.
const TRACING_TARGET: &str = "dealz_server::handler::authentication";

/// Response returned by every credential-issuing operation.
#[must_use]
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    /// Short-lived bearer credential authorizing API calls.
    pub access_token: String,
    /// Longer-lived credential used solely to mint a new pair.
    pub refresh_token: String,
    /// Human-readable status message.
    pub message: String,
}

/// Mints a signed access/refresh pair for an account.
///
/// The returned row is not yet recorded; callers pick the ledger write that
/// matches their flow (first issuance vs. supersede vs. rotate).
pub(crate) fn mint_credential_pair(
    session_keys: &SessionKeys,
    token_policy: TokenPolicy,
    account: &Account,
    ip_address: IpNet,
    user_agent: String,
) -> Result<NewCredentialPair> {
    let access_token = SessionClaims::new(account, TokenKind::Access, token_policy.access_ttl())?
        .encode(session_keys)?;
    let refresh_token =
        SessionClaims::new(account, TokenKind::Refresh, token_policy.refresh_ttl())?
            .encode(session_keys)?;

    Ok(NewCredentialPair {
        account_id: account.id,
        access_token,
        refresh_token,
        ip_address,
        user_agent,
    })
}

/// Request payload for registration.
#[must_use]
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "name": "Alice Doe",
    "email": "alice@school.edu",
    "password": "p@ssw0rd!"
}))]
struct RegisterRequest {
    /// Display name of the account.
    #[validate(length(min = 2, max = 64))]
    pub name: String,
    /// Email address; its domain must belong to a registered university.
    #[validate(email)]
    pub email: String,
    /// Password of the account.
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

/// Creates a new account gated by the university domain registry.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post, path = "/register", tag = "authentication",
    request_body(content = RegisterRequest, content_type = "application/json"),
    responses(
        (status = CREATED, description = "Account created, credentials issued", body = AuthResponse),
        (status = BAD_REQUEST, description = "Invalid payload or unknown university domain", body = ErrorResponse),
        (status = CONFLICT, description = "An account with this email already exists", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse),
    ),
)]
async fn register(
    State(pg_client): State<PgClient>,
    State(password_hasher): State<PasswordHasher>,
    State(session_keys): State<SessionKeys>,
    State(token_policy): State<TokenPolicy>,
    ClientAddr(ip_address): ClientAddr,
    user_agent: Option<TypedHeader<UserAgent>>,
    ValidateJson(request): ValidateJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let normalized_email = request.email.to_lowercase();

    tracing::trace!(
        target: TRACING_TARGET,
        email = %normalized_email,
        ip_address = %ip_address,
        "registration attempt"
    );

    let mut conn = pg_client.get_connection().await?;

    if conn.email_exists(&normalized_email).await? {
        tracing::warn!(
            target: TRACING_TARGET,
            email = %normalized_email,
            "registration failed: email already exists"
        );
        return Err(ErrorKind::DuplicateAccount.into_error());
    }

    // The email validator guarantees an `@` is present.
    let domain = normalized_email
        .split_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or_default();

    let Some(university) = conn.find_university_by_domain(domain).await? else {
        tracing::warn!(
            target: TRACING_TARGET,
            email = %normalized_email,
            domain = %domain,
            "registration failed: no university for domain"
        );
        return Err(ErrorKind::UnknownInstitution.into_error());
    };

    let password_hash = password_hasher.hash_password(&request.password)?;

    let new_account = NewAccount {
        university_id: university.id,
        display_name: request.name,
        email_address: normalized_email.clone(),
        password_hash: Some(password_hash),
        ..Default::default()
    };

    let account = conn.create_account(new_account).await?;
    tracing::info!(
        target: TRACING_TARGET,
        account_id = %account.id,
        university_id = %university.id,
        email = %account.email_address,
        "account created"
    );

    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string()).unwrap_or_default();
    let new_pair =
        mint_credential_pair(&session_keys, token_policy, &account, ip_address, user_agent)?;

    // First issuance: no prior pairs can exist for a fresh account.
    let pair = conn.create_credential_pair(new_pair).await?;

    tracing::info!(
        target: TRACING_TARGET,
        account_id = %account.id,
        credential_id = %pair.id,
        "registration successful: credential pair recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            message: "Account registration was successful".to_string(),
        }),
    ))
}

/// Request payload for login.
#[must_use]
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "email": "alice@school.edu",
    "password": "p@ssw0rd!"
}))]
struct LoginRequest {
    /// Email address of the account.
    #[validate(email)]
    pub email: String,
    /// Password of the account.
    pub password: String,
}

/// Authenticates with email and password, superseding all prior sessions.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post, path = "/login", tag = "authentication",
    request_body(content = LoginRequest, content_type = "application/json"),
    responses(
        (status = OK, description = "Credentials issued", body = AuthResponse),
        (status = BAD_REQUEST, description = "Invalid payload", body = ErrorResponse),
        (status = UNAUTHORIZED, description = "Unknown email or wrong password", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse),
    ),
)]
async fn login(
    State(pg_client): State<PgClient>,
    State(password_hasher): State<PasswordHasher>,
    State(session_keys): State<SessionKeys>,
    State(token_policy): State<TokenPolicy>,
    ClientAddr(ip_address): ClientAddr,
    user_agent: Option<TypedHeader<UserAgent>>,
    ValidateJson(request): ValidateJson<LoginRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let normalized_email = request.email.to_lowercase();

    tracing::trace!(
        target: TRACING_TARGET,
        email = %normalized_email,
        ip_address = %ip_address,
        "login attempt"
    );

    let mut conn = pg_client.get_connection().await?;
    let account = conn.find_account_by_email(&normalized_email).await?;

    // Always perform a hash verification so response timing cannot reveal
    // whether the email has an account (or only a federated one).
    let password_valid = match account.as_ref().and_then(|acc| acc.password_hash.as_deref()) {
        Some(stored_hash) => password_hasher
            .verify_password(&request.password, stored_hash)
            .is_ok(),
        None => password_hasher.verify_dummy_password(&request.password),
    };

    let login_successful = matches!(&account, Some(acc) if password_valid && acc.can_login());

    if !login_successful {
        tracing::warn!(
            target: TRACING_TARGET,
            email = %normalized_email,
            account_exists = account.is_some(),
            "login failed"
        );
        // One error for unknown email and wrong password alike.
        return Err(ErrorKind::InvalidCredentials.into_error());
    }

    let account = account.expect("verified above");

    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string()).unwrap_or_default();
    let new_pair =
        mint_credential_pair(&session_keys, token_policy, &account, ip_address, user_agent)?;

    // Revoke-all + record in one transaction (logout everywhere).
    let pair = conn.issue_credential_pair(new_pair).await?;

    tracing::info!(
        target: TRACING_TARGET,
        account_id = %account.id,
        credential_id = %pair.id,
        email = %normalized_email,
        "login successful: credential pair recorded"
    );

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            message: "Login was successful".to_string(),
        }),
    ))
}

/// Rotates a credential pair against a presented refresh token.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post, path = "/refresh_token", tag = "authentication",
    security(("bearer" = [])),
    responses(
        (status = OK, description = "New credential pair issued", body = AuthResponse),
        (status = UNAUTHORIZED, description = "Missing, malformed, expired, or revoked token", body = ErrorResponse),
        (status = NOT_FOUND, description = "Token subject has no matching account", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse),
    ),
)]
async fn refresh_token(
    State(pg_client): State<PgClient>,
    State(session_keys): State<SessionKeys>,
    State(token_policy): State<TokenPolicy>,
    ClientAddr(ip_address): ClientAddr,
    user_agent: Option<TypedHeader<UserAgent>>,
    session_header: SessionHeader,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let (presented_token, claims) = session_header.into_parts();

    tracing::trace!(
        target: TRACING_TARGET,
        subject = %claims.subject,
        "refresh attempt"
    );

    // Only a refresh token rotates credentials; an access token presented
    // here is as invalid as a revoked one.
    if !claims.kind.is_refresh() {
        tracing::warn!(
            target: TRACING_TARGET,
            subject = %claims.subject,
            "non-refresh token presented to refresh endpoint"
        );
        return Err(ErrorKind::InvalidOrRevokedToken.into_error());
    }

    let mut conn = pg_client.get_connection().await?;

    let account = conn
        .find_account_by_email(&claims.subject)
        .await?
        .ok_or_else(|| {
            tracing::error!(
                target: TRACING_TARGET,
                subject = %claims.subject,
                "refresh token subject missing from account directory"
            );
            ErrorKind::AccountNotFound.into_error()
        })?;

    if !account.can_login() {
        return Err(ErrorKind::Unauthorized.into_error());
    }

    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string()).unwrap_or_default();
    let new_pair =
        mint_credential_pair(&session_keys, token_policy, &account, ip_address, user_agent)?;

    // Lock-check-revoke-record in one transaction. A concurrent refresh
    // with the same token loses the row lock race and maps to
    // InvalidOrRevokedToken, never to a second live pair.
    let pair = conn.rotate_credential_pair(&presented_token, new_pair).await?;

    tracing::info!(
        target: TRACING_TARGET,
        account_id = %account.id,
        credential_id = %pair.id,
        "refresh successful: credential pair rotated"
    );

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            message: "New credentials issued".to_string(),
        }),
    ))
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .routes(routes!(refresh_token))
}

#[cfg(test)]
mod test {
    use dealz_postgres::query::CredentialRepository;

    use super::*;
    use crate::handler::test::{create_test_server, unique_email};

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: "SecurePassword123!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_success() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        let response = server.post("/register").json(&register_request(&email)).await;
        response.assert_status(StatusCode::CREATED);

        let body: AuthResponse = response.json();
        assert!(!body.access_token.is_empty());
        assert!(!body.refresh_token.is_empty());
        assert_ne!(body.access_token, body.refresh_token);

        Ok(())
    }

    #[tokio::test]
    async fn test_register_creates_exactly_one_active_pair() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;
        let email = unique_email();

        server.post("/register").json(&register_request(&email)).await;

        let mut conn = state.postgres.get_connection().await?;
        let account = conn
            .find_account_by_email(&email)
            .await?
            .expect("account must exist after registration");
        assert!(account.roles.contains(&"USER".to_string()));
        assert!(!account.is_verified);

        let by_id = conn.find_account_by_id(account.id).await?.unwrap();
        assert_eq!(by_id.email_address, account.email_address);

        let pairs = conn.list_account_credentials(account.id).await?;
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].is_active());

        let recorded = conn
            .find_credential_by_access_token(&pairs[0].access_token)
            .await?;
        assert_eq!(recorded.as_ref().map(|pair| pair.id), Some(pairs[0].id));

        Ok(())
    }

    #[tokio::test]
    async fn test_register_invalid_email() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;

        let response = server
            .post("/register")
            .json(&serde_json::json!({
                "name": "Test User",
                "email": "invalid-email",
                "password": "SecurePassword123!"
            }))
            .await;
        response.assert_status_bad_request();

        Ok(())
    }

    #[tokio::test]
    async fn test_register_unknown_domain() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;

        let response = server
            .post("/register")
            .json(&register_request("somebody@unregistered-domain.example"))
            .await;
        response.assert_status_bad_request();

        let mut conn = state.postgres.get_connection().await?;
        assert!(
            !conn
                .email_exists("somebody@unregistered-domain.example")
                .await?
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_register_duplicate_email() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        let response = server.post("/register").json(&register_request(&email)).await;
        response.assert_status(StatusCode::CREATED);

        let response = server.post("/register").json(&register_request(&email)).await;
        response.assert_status(StatusCode::CONFLICT);

        Ok(())
    }

    #[tokio::test]
    async fn test_login_success() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        server.post("/register").json(&register_request(&email)).await;

        let response = server
            .post("/login")
            .json(&LoginRequest {
                email: email.clone(),
                password: "SecurePassword123!".to_string(),
            })
            .await;
        response.assert_status_ok();

        let body: AuthResponse = response.json();
        assert!(!body.access_token.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_login_wrong_password() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        server.post("/register").json(&register_request(&email)).await;

        let response = server
            .post("/login")
            .json(&LoginRequest {
                email,
                password: "WrongPassword456!".to_string(),
            })
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_login_nonexistent_user_same_error() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        server.post("/register").json(&register_request(&email)).await;

        let wrong_password = server
            .post("/login")
            .json(&LoginRequest {
                email,
                password: "WrongPassword456!".to_string(),
            })
            .await;
        let unknown_email = server
            .post("/login")
            .json(&LoginRequest {
                email: unique_email(),
                password: "SomePassword123!".to_string(),
            })
            .await;

        // Account enumeration defense: both failures are indistinguishable.
        wrong_password.assert_status(StatusCode::UNAUTHORIZED);
        unknown_email.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password.text(), unknown_email.text());

        Ok(())
    }

    #[tokio::test]
    async fn test_login_revokes_prior_pairs() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;
        let email = unique_email();
        let login_request = LoginRequest {
            email: email.clone(),
            password: "SecurePassword123!".to_string(),
        };

        server.post("/register").json(&register_request(&email)).await;
        server.post("/login").json(&login_request).await;
        server.post("/login").json(&login_request).await;

        let mut conn = state.postgres.get_connection().await?;
        let account = conn.find_account_by_email(&email).await?.unwrap();
        let pairs = conn.list_account_credentials(account.id).await?;

        assert_eq!(pairs.len(), 3);
        let active: Vec<_> = pairs.iter().filter(|pair| pair.is_active()).collect();
        assert_eq!(active.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_email_normalization() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();
        let mixed_case = email.to_uppercase();

        server
            .post("/register")
            .json(&register_request(&mixed_case))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/login")
            .json(&LoginRequest {
                email,
                password: "SecurePassword123!".to_string(),
            })
            .await;
        response.assert_status_ok();

        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_rotates_pair() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;
        let email = unique_email();

        let registered: AuthResponse = server
            .post("/register")
            .json(&register_request(&email))
            .await
            .json();

        let response = server
            .post("/refresh_token")
            .add_header("Authorization", format!("Bearer {}", registered.refresh_token))
            .await;
        response.assert_status_ok();

        let rotated: AuthResponse = response.json();
        assert_ne!(rotated.access_token, registered.access_token);
        assert_ne!(rotated.refresh_token, registered.refresh_token);

        // The superseded pair no longer passes the ledger activity check.
        let mut conn = state.postgres.get_connection().await?;
        assert!(!conn.is_access_token_active(&registered.access_token).await?);
        let old_pair = conn
            .find_credential_by_refresh_token(&registered.refresh_token)
            .await?
            .unwrap();
        assert!(old_pair.is_revoked);

        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        let registered: AuthResponse = server
            .post("/register")
            .json(&register_request(&email))
            .await
            .json();

        let response = server
            .post("/refresh_token")
            .add_header("Authorization", format!("Bearer {}", registered.access_token))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_rejects_revoked_token() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;
        let email = unique_email();

        let registered: AuthResponse = server
            .post("/register")
            .json(&register_request(&email))
            .await
            .json();

        // First rotation succeeds and revokes the registered pair.
        server
            .post("/refresh_token")
            .add_header("Authorization", format!("Bearer {}", registered.refresh_token))
            .await
            .assert_status_ok();

        // Replaying the superseded refresh token must fail.
        let response = server
            .post("/refresh_token")
            .add_header("Authorization", format!("Bearer {}", registered.refresh_token))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_missing_header() -> anyhow::Result<()> {
        let (server, _state) = create_test_server().await?;

        let response = server.post("/refresh_token").await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() -> anyhow::Result<()> {
        let (server, state) = create_test_server().await?;
        let email = unique_email();

        let registered: AuthResponse = server
            .post("/register")
            .json(&register_request(&email))
            .await
            .json();
        let auth_header = format!("Bearer {}", registered.refresh_token);

        let (first, second) = tokio::join!(
            server
                .post("/refresh_token")
                .add_header("Authorization", auth_header.clone()),
            server
                .post("/refresh_token")
                .add_header("Authorization", auth_header.clone()),
        );

        let statuses = [first.status_code(), second.status_code()];
        assert!(statuses.contains(&StatusCode::OK));
        assert!(statuses.contains(&StatusCode::UNAUTHORIZED));

        // Exactly one active pair remains for the account.
        let mut conn = state.postgres.get_connection().await?;
        let account = conn.find_account_by_email(&email).await?.unwrap();
        let pairs = conn.list_account_credentials(account.id).await?;
        let active: Vec<_> = pairs.iter().filter(|pair| pair.is_active()).collect();
        assert_eq!(active.len(), 1);

        Ok(())
    }
}
