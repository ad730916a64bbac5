//! Market event subscriber.

use async_nats::{Client, Subscriber};
use futures::StreamExt;

use super::market_event::{MarketEvent, Topic};
use crate::{Error, Result, TRACING_TARGET_STREAM};

/// Subscription to a single market topic.
///
/// Each WebSocket connection holds one subscriber per subscribed topic;
/// dropping the subscriber unsubscribes.
#[derive(Debug)]
pub struct MarketEventSubscriber {
    topic: Topic,
    subscriber: Subscriber,
}

impl MarketEventSubscriber {
    /// Subscribes to a topic over an established connection.
    pub async fn subscribe(client: Client, topic: &Topic) -> Result<Self> {
        let subject = topic.subject();
        let subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| Error::subscribe(&subject, e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_STREAM,
            subject = %subject,
            "subscribed to market events"
        );

        Ok(Self {
            topic: topic.clone(),
            subscriber,
        })
    }

    /// Returns the subscribed topic.
    #[inline]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Awaits the next event on this topic.
    ///
    /// Returns `None` when the subscription ends. Payloads that fail to
    /// decode are dropped with a warning rather than terminating the
    /// subscription.
    pub async fn next_event(&mut self) -> Option<MarketEvent> {
        while let Some(message) = self.subscriber.next().await {
            match serde_json::from_slice::<MarketEvent>(&message.payload) {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::warn!(
                        target: TRACING_TARGET_STREAM,
                        topic = %self.topic,
                        error = %e,
                        "dropping undecodable market event"
                    );
                }
            }
        }

        None
    }

    /// Unsubscribes from the topic.
    pub async fn unsubscribe(mut self) -> Result<()> {
        let subject = self.topic.subject();
        self.subscriber
            .unsubscribe()
            .await
            .map_err(|e| Error::subscribe(&subject, e.to_string()))
    }
}
