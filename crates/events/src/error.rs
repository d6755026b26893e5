use thiserror::Error;

use crate::Topic;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown topic: {topic}")]
    UnknownTopic { topic: String },

    #[error("topic {topic} has a typed event variant and cannot be published as a generic event")]
    TypedTopic { topic: Topic },

    #[error("invalid {topic} event: {source}")]
    InvalidFields {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
}

impl EventError {
    #[must_use]
    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        Self::UnknownTopic {
            topic: topic.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,
}
