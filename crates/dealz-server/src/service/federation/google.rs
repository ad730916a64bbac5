//! Google OAuth 2.0 / OpenID Connect client.
//!
//! Performs the two provider calls that complete a federated login after the
//! browser returns from the consent screen: exchanging the authorization
//! code for tokens, and fetching the userinfo profile the provisioning
//! handler consumes. By the time the handler runs, these calls have already
//! produced a [`FederatedIdentity`]; the handler itself never talks to the
//! provider.

use std::time::Duration;

use dealz_postgres::types::AccountProvider;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::handler::{Error, ErrorKind};

/// Tracing target for federated identity operations.
const TRACING_TARGET: &str = "dealz_server::service::federation";

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const OAUTH_SCOPES: &str = "openid email profile";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from the external identity provider exchange.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("Federation configuration missing: {0}")]
    MissingConfig(String),

    #[error("Token exchange with provider failed: {0}")]
    Exchange(String),

    #[error("Provider response was invalid: {0}")]
    InvalidResponse(String),
}

impl From<FederationError> for Error<'static> {
    fn from(error: FederationError) -> Self {
        match error {
            FederationError::MissingConfig(reason) => {
                tracing::error!(target: TRACING_TARGET, %reason, "federation misconfigured");
                ErrorKind::InternalServerError.into_error()
            }
            // The browser initiated this flow; all it needs to know is that
            // the external login did not complete.
            FederationError::Exchange(reason) | FederationError::InvalidResponse(reason) => {
                tracing::warn!(target: TRACING_TARGET, %reason, "federated login failed");
                ErrorKind::Unauthorized
                    .with_message("External login failed")
                    .into_static()
            }
        }
    }
}

/// Identity asserted by the external provider after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Which provider asserted this identity.
    pub provider: AccountProvider,
    /// Provider-assigned stable subject id.
    pub subject: String,
    /// Asserted email address, lowercased.
    pub email: String,
    /// Display name from the provider profile.
    pub display_name: String,
}

/// Credentials and redirect target registered with Google.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URL registered for the authorization code flow.
    pub redirect_url: String,
}

/// HTTP client for the Google token and userinfo endpoints.
#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserinfoResponse {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

impl GoogleOAuthClient {
    /// Creates a new client from registered credentials.
    ///
    /// # Errors
    ///
    /// Fails when the client id or secret is empty, or the HTTP client
    /// cannot be constructed.
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, FederationError> {
        if config.client_id.is_empty() {
            return Err(FederationError::MissingConfig("client id".into()));
        }
        if config.client_secret.is_empty() {
            return Err(FederationError::MissingConfig("client secret".into()));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FederationError::Exchange(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Builds the consent-screen URL the browser is redirected to.
    pub fn authorize_url(&self, state: &str) -> Result<Url, FederationError> {
        let mut url = Url::parse(AUTHORIZE_ENDPOINT)
            .map_err(|e| FederationError::InvalidResponse(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", OAUTH_SCOPES)
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchanges an authorization code for a provider access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, FederationError> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| FederationError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FederationError::Exchange(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| FederationError::InvalidResponse(e.to_string()))?;

        Ok(tokens.access_token)
    }

    /// Fetches the asserted identity behind a provider access token.
    pub async fn fetch_identity(
        &self,
        provider_access_token: &str,
    ) -> Result<FederatedIdentity, FederationError> {
        let response = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(provider_access_token)
            .send()
            .await
            .map_err(|e| FederationError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FederationError::Exchange(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        let userinfo: UserinfoResponse = response
            .json()
            .await
            .map_err(|e| FederationError::InvalidResponse(e.to_string()))?;

        let email = userinfo
            .email
            .ok_or_else(|| FederationError::InvalidResponse("no email in userinfo".into()))?
            .to_lowercase();

        if !userinfo.email_verified {
            tracing::warn!(
                target: TRACING_TARGET,
                email = %email,
                "provider reports unverified email; proceeding"
            );
        }

        let display_name = userinfo
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                email
                    .split_once('@')
                    .map(|(local, _)| local.to_owned())
                    .unwrap_or_else(|| email.clone())
            });

        Ok(FederatedIdentity {
            provider: AccountProvider::Google,
            subject: userinfo.sub,
            email,
            display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(GoogleOAuthConfig {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            redirect_url: "http://localhost:8080/login/oauth2/code/google".into(),
        })
        .unwrap()
    }

    #[test]
    fn rejects_empty_credentials() {
        let result = GoogleOAuthClient::new(GoogleOAuthConfig {
            client_id: String::new(),
            client_secret: "secret".into(),
            redirect_url: "http://localhost".into(),
        });
        assert!(matches!(result, Err(FederationError::MissingConfig(_))));
    }

    #[test]
    fn authorize_url_carries_redirect_and_state() {
        let url = test_client().authorize_url("csrf-token").unwrap();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(query.contains(&("response_type".into(), "code".into())));
        assert!(query.contains(&("state".into(), "csrf-token".into())));
        assert!(query.iter().any(|(k, v)| k == "scope" && v.contains("email")));
    }
}
