//! Push notification engine.
//!
//! For every `message.created` event: compute who should hear about it, shape
//! one payload, and send it to each recipient's device tokens through a
//! [`PushGateway`], retrying transient failures and unregistering dead tokens.

pub mod audience;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod payload;
pub mod service;

pub use {
    audience::{ChannelClass, compute_audience},
    delivery::{RetryPolicy, TokenOutcome, send_with_retry},
    error::{DeliveryError, ErrorClass, NotifyError, PushError},
    gateway::{DryRunGateway, HttpPushGateway, PushGateway},
    payload::{PayloadShaper, PushPayload, ShapeInput, truncate_body},
    service::{NotificationReport, NotificationService},
};
