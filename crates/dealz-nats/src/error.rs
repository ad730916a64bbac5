//! Error types and utilities for NATS operations.

use std::time::Duration;

/// Result type for all NATS operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for NATS operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// NATS client/connection errors
    #[error("NATS connection error: {0}")]
    Connection(Box<dyn std::error::Error + Send + Sync>),

    /// Serialization errors when sending or receiving messages
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Publish error on a core NATS subject
    #[error("Publish error on subject '{subject}': {reason}")]
    Publish { subject: String, reason: String },

    /// Subscription error on a core NATS subject
    #[error("Subscribe error on subject '{subject}': {reason}")]
    Subscribe { subject: String, reason: String },

    /// Operation timeout
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Rejected topic name
    #[error("Invalid topic name: {reason}")]
    InvalidTopic { reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Creates a publish error with context.
    pub fn publish(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Publish {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Creates a subscribe error with context.
    pub fn subscribe(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Subscribe {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-topic error.
    pub fn invalid_topic(reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns whether the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection(_))
    }
}
