//! Market event publisher.

use async_nats::Client;

use super::market_event::{MarketEvent, Topic};
use crate::{Error, Result, TRACING_TARGET_STREAM};

/// Publisher for market events.
///
/// Events are published to the subject `market.events.{topic}` on core NATS;
/// the channel is an ephemeral fan-out with no replay, so there is no stream
/// retention behind it.
#[derive(Debug, Clone)]
pub struct MarketEventPublisher {
    client: Client,
}

impl MarketEventPublisher {
    /// Creates a new publisher over an established connection.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publishes one event to a topic.
    pub async fn publish(&self, topic: &Topic, event: MarketEvent) -> Result<()> {
        let subject = topic.subject();
        let payload = serde_json::to_vec(&event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| Error::publish(&subject, e.to_string()))?;

        tracing::trace!(
            target: TRACING_TARGET_STREAM,
            subject = %subject,
            kind = ?event.kind,
            "published market event"
        );

        Ok(())
    }
}
