//! Market event types for real-time WebSocket communication.
//!
//! Events published to a topic fan out over NATS to every server instance
//! holding a subscription for that topic, enabling distributed real-time
//! messaging across multiple server replicas.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Subject prefix all market events are published under.
const SUBJECT_PREFIX: &str = "market.events";

/// Maximum accepted topic name length.
const MAX_TOPIC_LEN: usize = 64;

/// A validated topic name.
///
/// Topic names become NATS subject segments, so the character set is
/// restricted to ASCII alphanumerics, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Returns the topic name.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the NATS subject this topic maps to.
    pub fn subject(&self) -> String {
        format!("{}.{}", SUBJECT_PREFIX, self.0)
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(Error::invalid_topic("topic name cannot be empty"));
        }
        if value.len() > MAX_TOPIC_LEN {
            return Err(Error::invalid_topic(format!(
                "topic name exceeds {} characters",
                MAX_TOPIC_LEN
            )));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(Error::invalid_topic(
                "topic names may only contain alphanumerics, '_' and '-'",
            ));
        }

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Topic {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload variants carried by a market event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketEventKind {
    /// A subscriber joined the topic.
    Joined,
    /// A subscriber left the topic.
    Left,
    /// A chat/notification payload.
    Message,
}

/// One event on a market topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketEvent {
    /// Event kind.
    pub kind: MarketEventKind,
    /// Account that produced the event; `None` for server-originated events.
    pub sender_id: Option<Uuid>,
    /// Event body; empty for presence events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Time the event was published.
    pub timestamp: Timestamp,
}

impl MarketEvent {
    /// Creates a message event.
    pub fn message(sender_id: Option<Uuid>, body: String) -> Self {
        Self {
            kind: MarketEventKind::Message,
            sender_id,
            body,
            timestamp: Timestamp::now(),
        }
    }

    /// Creates a presence-join event.
    pub fn joined(sender_id: Uuid) -> Self {
        Self {
            kind: MarketEventKind::Joined,
            sender_id: Some(sender_id),
            body: String::new(),
            timestamp: Timestamp::now(),
        }
    }

    /// Creates a presence-leave event.
    pub fn left(sender_id: Uuid) -> Self {
        Self {
            kind: MarketEventKind::Left,
            sender_id: Some(sender_id),
            body: String::new(),
            timestamp: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_accepts_simple_names() {
        let topic: Topic = "deals-cs101".parse().unwrap();
        assert_eq!(topic.subject(), "market.events.deals-cs101");
    }

    #[test]
    fn topic_rejects_subject_metacharacters() {
        assert!("deals.cs101".parse::<Topic>().is_err());
        assert!("deals cs101".parse::<Topic>().is_err());
        assert!("deals>".parse::<Topic>().is_err());
        assert!("".parse::<Topic>().is_err());
    }

    #[test]
    fn topic_rejects_oversized_names() {
        let long = "a".repeat(65);
        assert!(long.parse::<Topic>().is_err());
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = MarketEvent::message(Some(Uuid::nil()), "textbook for sale".into());
        let json = serde_json::to_string(&event).unwrap();
        let parsed: MarketEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn presence_events_skip_empty_body() {
        let event = MarketEvent::joined(Uuid::nil());
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("\"body\""));
    }
}
