//! NATS client wrapper and connection management.
//!
//! The underlying `async-nats` client multiplexes all operations over a
//! single TCP connection and is `Arc`-shared internally, so cloning this
//! wrapper is cheap and every clone shares the same connection.

use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions};
use tokio::time::timeout;

use super::nats_config::NatsConfig;
use crate::stream::{MarketEventPublisher, MarketEventSubscriber, Topic};
use crate::{Error, Result, TRACING_TARGET_CONNECTION};

/// NATS client wrapper with connection management.
///
/// Cheaply cloneable and thread-safe; clones share one TCP connection.
#[derive(Debug, Clone)]
pub struct NatsClient {
    inner: Arc<NatsClientInner>,
}

#[derive(Debug)]
struct NatsClientInner {
    client: Client,
    config: NatsConfig,
}

impl NatsClient {
    /// Create a new NATS client and connect
    #[tracing::instrument(skip(config))]
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            target: TRACING_TARGET_CONNECTION,
            servers = %config.nats_url,
            "Connecting to NATS servers"
        );

        let mut connect_opts = ConnectOptions::new()
            .name(config.name())
            .ping_interval(config.ping_interval());

        if let Some(token) = &config.nats_token {
            connect_opts = connect_opts.token(token.clone());
        }

        if let Some(timeout) = config.connect_timeout() {
            connect_opts = connect_opts.connection_timeout(timeout);
        }

        if let Some(max_reconnects) = config.max_reconnects_option() {
            connect_opts = connect_opts.max_reconnects(max_reconnects);
        }

        let reconnect_delay_ms = config.reconnect_delay().as_millis().min(u64::MAX as u128) as u64;
        connect_opts = connect_opts.reconnect_delay_callback(move |attempts| {
            Duration::from_millis(std::cmp::min(
                reconnect_delay_ms * 2_u64.pow(attempts.min(32) as u32),
                30_000, // Max 30 seconds
            ))
        });

        // Use the configured timeout or a sensible default (30 seconds)
        let connect_timeout = config.connect_timeout().unwrap_or(Duration::from_secs(30));
        let client = timeout(
            connect_timeout,
            async_nats::connect_with_options(&config.nats_url, connect_opts),
        )
        .await
        .map_err(|_| Error::Timeout {
            timeout: connect_timeout,
        })?
        .map_err(|e| Error::Connection(Box::new(e)))?;

        let server_info = client.server_info();
        tracing::info!(
            target: TRACING_TARGET_CONNECTION,
            server_host = %server_info.host,
            server_version = %server_info.version,
            server_id = %server_info.server_id,
            "Successfully connected to NATS"
        );

        Ok(Self {
            inner: Arc::new(NatsClientInner { client, config }),
        })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &NatsConfig {
        &self.inner.config
    }

    /// Test connectivity with a round-trip flush.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CONNECTION)]
    pub async fn ping(&self) -> Result<Duration> {
        let start = std::time::Instant::now();
        self.inner
            .client
            .flush()
            .await
            .map_err(|e| Error::Connection(Box::new(e)))?;
        Ok(start.elapsed())
    }

    /// Returns a publisher for market events.
    #[must_use]
    pub fn market_event_publisher(&self) -> MarketEventPublisher {
        MarketEventPublisher::new(self.inner.client.clone())
    }

    /// Subscribes to market events for a single topic.
    pub async fn market_event_subscriber(&self, topic: &Topic) -> Result<MarketEventSubscriber> {
        MarketEventSubscriber::subscribe(self.inner.client.clone(), topic).await
    }
}
