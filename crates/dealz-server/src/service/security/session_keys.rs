//! Signing keys for bearer credential tokens.
//!
//! Tokens are signed with HMAC-SHA-256 using a single server-held secret.
//! The secret is injected through configuration (base64-encoded) and must
//! decode to at least 32 bytes; the process refuses to start otherwise, so a
//! missing or weak secret can never silently mint weakly-signed tokens.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::TRACING_TARGET_AUTHENTICATION;
use crate::handler::{ErrorKind, Result};

/// Minimum decoded secret length in bytes (256 bits).
const MIN_SECRET_BYTES: usize = 32;

/// Secret keys used to sign and verify credential tokens.
///
/// Thread-safe and cheap to clone; all clones share the same key material.
#[derive(Clone)]
pub struct SessionKeys {
    inner: Arc<SessionKeysInner>,
}

struct SessionKeysInner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionKeys {
    /// Creates session keys from a base64-encoded secret.
    ///
    /// # Errors
    ///
    /// Fails when the secret is empty, not valid base64, or decodes to fewer
    /// than 32 bytes. Callers are expected to treat this as fatal at startup.
    pub fn from_base64(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(ErrorKind::InternalServerError
                .with_message("Signing secret is missing or empty")
                .into_static());
        }

        let secret_bytes = BASE64.decode(secret.trim()).map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_AUTHENTICATION,
                error = %e,
                "signing secret is not valid base64"
            );
            ErrorKind::InternalServerError
                .with_message("Signing secret is not valid base64")
                .into_static()
        })?;

        if secret_bytes.len() < MIN_SECRET_BYTES {
            return Err(ErrorKind::InternalServerError
                .with_message("Signing secret is too short")
                .with_context(format!(
                    "Expected at least {} bytes, got {}",
                    MIN_SECRET_BYTES,
                    secret_bytes.len()
                ))
                .into_static());
        }

        tracing::debug!(
            target: TRACING_TARGET_AUTHENTICATION,
            secret_bytes = secret_bytes.len(),
            "loaded credential signing secret"
        );

        Ok(Self {
            inner: Arc::new(SessionKeysInner {
                encoding_key: EncodingKey::from_secret(&secret_bytes),
                decoding_key: DecodingKey::from_secret(&secret_bytes),
            }),
        })
    }

    /// Returns the key used to sign tokens.
    #[inline]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.inner.encoding_key
    }

    /// Returns the key used to verify token signatures.
    #[inline]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.inner.decoding_key
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material must never appear in logs.
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_secret(len: usize) -> String {
        BASE64.encode(vec![0x5a; len])
    }

    #[test]
    fn accepts_256_bit_secret() {
        assert!(SessionKeys::from_base64(&encoded_secret(32)).is_ok());
        assert!(SessionKeys::from_base64(&encoded_secret(48)).is_ok());
    }

    #[test]
    fn rejects_empty_secret() {
        assert!(SessionKeys::from_base64("").is_err());
        assert!(SessionKeys::from_base64("   ").is_err());
    }

    #[test]
    fn rejects_short_secret() {
        assert!(SessionKeys::from_base64(&encoded_secret(16)).is_err());
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(SessionKeys::from_base64("!!not-base64!!").is_err());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let keys = SessionKeys::from_base64(&encoded_secret(32)).unwrap();
        let debug = format!("{:?}", keys);
        assert!(!debug.contains("5a"));
        assert!(!debug.contains("Zlpa"));
    }
}
