//! Domain events and the in-process bus that fans them out to consumers.

pub mod bus;
pub mod error;
pub mod event;
pub mod topic;
pub mod worker;

pub use {
    bus::{EventBus, PublishReport, Subscription},
    error::{BusError, EventError},
    event::{
        BotMembership, BotPing, ChannelCreated, DomainEvent, GenericEvent, MessageCreated,
        UserCreated,
    },
    topic::Topic,
    worker::run_consumer,
};
