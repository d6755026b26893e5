//! Bot Dispatch Processor.
//!
//! Subscribes to bot-relevant domain events, narrows the bot registry with
//! [`BotFilter`]s, encodes one webhook body per event and delivers it to
//! every remaining bot. `bot.ping` outcomes drive the bot health state.

pub mod error;
pub mod filter;
pub mod payload;
pub mod processor;
pub mod transport;

pub use {
    error::DispatchError,
    filter::{BotFilter, apply_filters},
    processor::{BotProcessor, DispatchReport, TOPICS},
    transport::{BotTransport, DeliveryOutcome, DryRunTransport, HttpBotTransport},
};
