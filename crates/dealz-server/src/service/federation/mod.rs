//! External identity provider clients for federated provisioning.

mod google;

pub use self::google::{FederatedIdentity, FederationError, GoogleOAuthClient, GoogleOAuthConfig};
