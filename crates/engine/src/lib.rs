//! The herald engine: one event bus feeding the bot dispatch processor and the
//! push notification service.

mod engine;

pub use engine::{DeliveryMode, Engine, ShutdownReport};
