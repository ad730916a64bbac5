//! Market event pub/sub for the real-time channel.

mod market_event;
mod market_event_pub;
mod market_event_sub;

pub use self::market_event::{MarketEvent, MarketEventKind, Topic};
pub use self::market_event_pub::MarketEventPublisher;
pub use self::market_event_sub::MarketEventSubscriber;
