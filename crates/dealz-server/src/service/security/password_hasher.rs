//! Secure password hashing and verification using Argon2id.
//!
//! Hashing and verification are designed for use in HTTP handlers and return
//! HTTP error responses for client consumption. Verification against a
//! built-in dummy hash keeps login timing uniform when the account does not
//! exist or has no local password.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier};
use rand::rngs::OsRng;

use crate::handler::{ErrorKind, Result};

/// Tracing target for password hashing operations.
const TRACING_TARGET: &str = "dealz_server::service::password_hasher";

/// Fixed input for dummy verification; the resulting hash is computed once
/// per instance so dummy and real verifications cost the same.
const DUMMY_PASSWORD: &str = "dummy-timing-equalizer";

/// Secure password hashing and verification service using Argon2id.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordHasher {
    /// Creates a new instance of the [`PasswordHasher`] service.
    pub fn new() -> Self {
        let argon2 = Argon2::default();

        // An empty dummy hash only disables the timing equalizer; real
        // verification is unaffected.
        let dummy_hash = SaltString::try_from_rng(&mut OsRng)
            .ok()
            .and_then(|salt| argon2.hash_password(DUMMY_PASSWORD.as_bytes(), &salt).ok())
            .map(|hash| hash.to_string())
            .unwrap_or_default();

        Self { argon2, dummy_hash }
    }

    /// Hashes a password using Argon2id with a random salt.
    ///
    /// The returned PHC string includes the algorithm, parameters, salt, and
    /// hash value and can be stored directly in the database.
    ///
    /// # Errors
    ///
    /// Returns an internal server error if salt generation or hashing fails.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::try_from_rng(&mut OsRng).map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET,
                error = %e,
                "failed to generate cryptographically secure salt"
            );

            ErrorKind::InternalServerError
                .with_message("Password processing failed")
                .with_context("Salt generation error")
                .into_static()
        })?;

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(
                    target: TRACING_TARGET,
                    error = %e,
                    "password hashing operation failed"
                );

                ErrorKind::InternalServerError
                    .with_message("Password processing failed")
                    .with_context("Hash generation error")
                    .into_static()
            })?;

        Ok(password_hash.to_string())
    }

    /// Verifies a password against a stored hash.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidCredentials` for incorrect passwords and
    /// `ErrorKind::InternalServerError` for unparseable stored hashes.
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> Result<()> {
        let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
            tracing::warn!(
                target: TRACING_TARGET,
                error = %e,
                "invalid password hash format in storage"
            );

            ErrorKind::InternalServerError
                .with_message("Credential verification failed")
                .into_static()
        })?;

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| ErrorKind::InvalidCredentials.into_error())
    }

    /// Performs a dummy verification with consistent timing.
    ///
    /// Called when the account does not exist or carries no local password,
    /// so response timing cannot be used to enumerate accounts. Always
    /// returns `false`.
    pub fn verify_dummy_password(&self, password: &str) -> bool {
        if let Ok(parsed_hash) = PasswordHash::new(&self.dummy_hash) {
            let _ = self.argon2.verify_password(password.as_bytes(), &parsed_hash);
        }

        false
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash_password("p@ss1").unwrap();

        assert!(hasher.verify_password("p@ss1", &hash).is_ok());
        assert!(hasher.verify_password("wrong", &hash).is_err());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = PasswordHasher::new();
        let first = hasher.hash_password("p@ss1").unwrap();
        let second = hasher.hash_password("p@ss1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_password_maps_to_invalid_credentials() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash_password("correct").unwrap();
        let error = hasher.verify_password("incorrect", &hash).unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::InvalidCredentials);
    }

    #[test]
    fn dummy_verification_always_fails() {
        let hasher = PasswordHasher::new();
        assert!(!hasher.verify_dummy_password("anything"));
        assert!(!hasher.verify_dummy_password(DUMMY_PASSWORD));
    }
}
