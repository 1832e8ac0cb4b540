//! Internal publish/subscribe bus used to fan lifecycle and scheduler
//! notifications out to interested components without direct coupling.

pub mod bus;
pub mod event;
pub mod subscriber;

pub use bus::{EventBus, EventBusConfig};
pub use event::{DomainEvent, EventType};
pub use subscriber::{Subscriber, SubscriberConfig};
