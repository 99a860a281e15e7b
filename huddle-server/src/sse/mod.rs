//! SSE fan-out: event bus, client stream endpoint, count broadcasts

pub mod bus;
pub mod notify;
pub mod stream;

pub use bus::{EventBus, SubscriberId, Subscription};
