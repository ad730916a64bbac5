//! Application state and dependency injection.

mod config;
mod federation;
mod security;

use dealz_nats::NatsClient;
use dealz_postgres::PgClient;

pub use crate::service::config::{FrontendUrl, ServiceConfig, TokenPolicy};
pub use crate::service::federation::{
    FederatedIdentity, FederationError, GoogleOAuthClient, GoogleOAuthConfig,
};
pub use crate::service::security::{PasswordHasher, SessionKeys};
// Re-export error types from crate root for convenience
pub use crate::{Error, Result};

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    // External services:
    pub postgres: PgClient,
    pub nats: NatsClient,

    // Internal services:
    pub session_keys: SessionKeys,
    pub password_hasher: PasswordHasher,
    pub google_oauth: GoogleOAuthClient,
    pub token_policy: TokenPolicy,
    pub frontend_url: FrontendUrl,
}

impl ServiceState {
    /// Initializes application state from configuration.
    ///
    /// Connects to all external services and loads required resources.
    /// Fails fast on a missing or weak signing secret.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let service_state = Self {
            postgres: config.connect_postgres().await?,
            nats: config.connect_nats().await?,

            session_keys: config.load_session_keys()?,
            password_hasher: PasswordHasher::new(),
            google_oauth: config.google_oauth_client()?,
            token_policy: config.token_policy(),
            frontend_url: config.parse_frontend_url()?,
        };

        Ok(service_state)
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+ $(,)?) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

// External services:
impl_di!(postgres: PgClient);
impl_di!(nats: NatsClient);

// Internal services:
impl_di!(session_keys: SessionKeys);
impl_di!(password_hasher: PasswordHasher);
impl_di!(google_oauth: GoogleOAuthClient);
impl_di!(token_policy: TokenPolicy);
impl_di!(frontend_url: FrontendUrl);
