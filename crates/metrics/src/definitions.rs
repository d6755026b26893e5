//! Metric name and label definitions.
//!
//! All metric names used by the dispatch engine live here so the set of
//! exported series is documented in one place.

/// Domain event bus metrics
pub mod bus {
    /// Events handed to `publish`
    pub const EVENTS_PUBLISHED_TOTAL: &str = "herald_bus_events_published_total";
    /// Per-subscriber copies enqueued
    pub const EVENTS_DELIVERED_TOTAL: &str = "herald_bus_events_delivered_total";
    /// Per-subscriber copies dropped because the queue was full
    pub const EVENTS_DROPPED_TOTAL: &str = "herald_bus_events_dropped_total";
    /// Current number of live subscriptions
    pub const SUBSCRIBERS: &str = "herald_bus_subscribers";
}

/// Bot dispatch metrics
pub mod bots {
    /// Events the bot processor handled
    pub const EVENTS_TOTAL: &str = "herald_bot_events_total";
    /// Webhook delivery attempts, labelled by outcome
    pub const DELIVERIES_TOTAL: &str = "herald_bot_deliveries_total";
    /// Webhook delivery duration in seconds
    pub const DELIVERY_DURATION_SECONDS: &str = "herald_bot_delivery_duration_seconds";
    /// Bot health state transitions after a ping
    pub const STATE_CHANGES_TOTAL: &str = "herald_bot_state_changes_total";
    /// Events abandoned because of storage or serialization errors
    pub const DISPATCH_ERRORS_TOTAL: &str = "herald_bot_dispatch_errors_total";
}

/// Push notification metrics
pub mod push {
    /// `message.created` events the notification service handled
    pub const EVENTS_TOTAL: &str = "herald_push_events_total";
    /// Users selected as notification recipients
    pub const RECIPIENTS_TOTAL: &str = "herald_push_recipients_total";
    /// Gateway send attempts (including retries)
    pub const SEND_ATTEMPTS_TOTAL: &str = "herald_push_send_attempts_total";
    /// Per-token results, labelled by outcome
    pub const TOKENS_TOTAL: &str = "herald_push_tokens_total";
    /// Device tokens unregistered after a gateway rejection
    pub const UNREGISTERED_TOTAL: &str = "herald_push_unregistered_total";
    /// Gateway send duration in seconds
    pub const SEND_DURATION_SECONDS: &str = "herald_push_send_duration_seconds";
    /// Events abandoned because of storage errors
    pub const NOTIFY_ERRORS_TOTAL: &str = "herald_push_notify_errors_total";
}

/// Common label keys
pub mod labels {
    pub const TOPIC: &str = "topic";
    pub const EVENT: &str = "event";
    pub const OUTCOME: &str = "outcome";
    pub const STATE: &str = "state";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Outbound call duration buckets (in seconds), 5ms to 30s
    pub const OUTBOUND_DURATION: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];
}
