//! NATS client wrapper and connection configuration.

mod nats_client;
mod nats_config;

pub use self::nats_client::NatsClient;
pub use self::nats_config::NatsConfig;
