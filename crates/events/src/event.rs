//! Typed domain events.
//!
//! Topics consumed by the dispatch engine carry typed fields; every other
//! topic travels as a [`GenericEvent`] with a JSON field map. On the wire an
//! event is a flat JSON object with a `topic` key next to its fields.

use {
    herald_common::model::{Bot, BotId, Channel, ChannelId, EmbeddedRef, Message, User, UserId},
    serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::{self, DeserializeOwned},
        ser::{self, SerializeMap},
    },
    serde_json::{Map, Value},
};

use crate::{Topic, error::EventError};

/// `message.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message: Message,
    /// References extracted from the message text.
    #[serde(default)]
    pub embedded: Vec<EmbeddedRef>,
    /// Plain-text rendering of the message.
    #[serde(default)]
    pub plain: String,
}

/// `channel.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCreated {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub private: bool,
}

/// `user.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    #[serde(default)]
    pub user: Option<User>,
}

/// `bot.ping`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotPing {
    pub bot_id: BotId,
    /// Snapshot of the bot at publish time, when the publisher had one.
    #[serde(default)]
    pub bot: Option<Bot>,
}

/// `bot.joined` / `bot.left`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BotMembership {
    pub bot_id: BotId,
    pub channel_id: ChannelId,
}

/// Any topic without a typed variant.
#[derive(Debug, Clone)]
pub struct GenericEvent {
    pub topic: Topic,
    pub fields: Map<String, Value>,
}

/// An immutable domain event.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    MessageCreated(MessageCreated),
    ChannelCreated(ChannelCreated),
    UserCreated(UserCreated),
    BotPing(BotPing),
    BotJoined(BotMembership),
    BotLeft(BotMembership),
    Generic(GenericEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::MessageCreated(_) => Topic::MessageCreated,
            Self::ChannelCreated(_) => Topic::ChannelCreated,
            Self::UserCreated(_) => Topic::UserCreated,
            Self::BotPing(_) => Topic::BotPing,
            Self::BotJoined(_) => Topic::BotJoined,
            Self::BotLeft(_) => Topic::BotLeft,
            Self::Generic(e) => e.topic,
        }
    }

    /// Build an event for a topic without a typed variant.
    pub fn generic(topic: Topic, fields: Map<String, Value>) -> Result<Self, EventError> {
        if topic.is_typed() {
            return Err(EventError::TypedTopic { topic });
        }
        Ok(Self::Generic(GenericEvent { topic, fields }))
    }

    /// Build an event from a topic and its untyped fields, validating the
    /// field schema of typed topics.
    pub fn from_fields(topic: Topic, fields: Map<String, Value>) -> Result<Self, EventError> {
        match topic {
            Topic::MessageCreated => parse(topic, fields).map(Self::MessageCreated),
            Topic::ChannelCreated => parse(topic, fields).map(Self::ChannelCreated),
            Topic::UserCreated => parse(topic, fields).map(Self::UserCreated),
            Topic::BotPing => parse(topic, fields).map(Self::BotPing),
            Topic::BotJoined => parse(topic, fields).map(Self::BotJoined),
            Topic::BotLeft => parse(topic, fields).map(Self::BotLeft),
            _ => Ok(Self::Generic(GenericEvent { topic, fields })),
        }
    }
}

fn parse<T: DeserializeOwned>(topic: Topic, fields: Map<String, Value>) -> Result<T, EventError> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|source| EventError::InvalidFields { topic, source })
}

impl From<MessageCreated> for DomainEvent {
    fn from(e: MessageCreated) -> Self {
        Self::MessageCreated(e)
    }
}

impl From<ChannelCreated> for DomainEvent {
    fn from(e: ChannelCreated) -> Self {
        Self::ChannelCreated(e)
    }
}

impl From<UserCreated> for DomainEvent {
    fn from(e: UserCreated) -> Self {
        Self::UserCreated(e)
    }
}

impl From<BotPing> for DomainEvent {
    fn from(e: BotPing) -> Self {
        Self::BotPing(e)
    }
}

// ── Wire format ─────────────────────────────────────────────────────────────

impl Serialize for DomainEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = match self {
            Self::MessageCreated(e) => serde_json::to_value(e),
            Self::ChannelCreated(e) => serde_json::to_value(e),
            Self::UserCreated(e) => serde_json::to_value(e),
            Self::BotPing(e) => serde_json::to_value(e),
            Self::BotJoined(e) | Self::BotLeft(e) => serde_json::to_value(e),
            Self::Generic(e) => Ok(Value::Object(e.fields.clone())),
        }
        .map_err(ser::Error::custom)?;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("topic", &self.topic())?;
        if let Value::Object(fields) = &fields {
            for (key, value) in fields.iter().filter(|(k, _)| k.as_str() != "topic") {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DomainEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let topic: Topic = match fields.remove("topic") {
            Some(Value::String(name)) => name.parse().map_err(de::Error::custom)?,
            Some(_) => return Err(de::Error::custom("topic must be a string")),
            None => return Err(de::Error::missing_field("topic")),
        };
        Self::from_fields(topic, fields).map_err(de::Error::custom)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, uuid::Uuid};

    #[test]
    fn parses_typed_message_created() {
        let (id, user, channel) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let raw = json!({
            "topic": "message.created",
            "message": {"id": id, "user_id": user, "channel_id": channel, "text": "hi @bob"},
            "embedded": [{"raw": "@bob", "type": "user", "id": "not-a-uuid"}],
            "plain": "hi @bob",
        });
        let event: DomainEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.topic(), Topic::MessageCreated);
        let DomainEvent::MessageCreated(e) = event else {
            panic!("wrong variant");
        };
        assert_eq!(e.message.channel_id, channel);
        assert_eq!(e.embedded.len(), 1);
        assert_eq!(e.plain, "hi @bob");
    }

    #[test]
    fn mismatched_fields_are_rejected() {
        let raw = json!({"topic": "bot.joined", "bot_id": 42});
        let err = serde_json::from_value::<DomainEvent>(raw).unwrap_err();
        assert!(err.to_string().contains("bot.joined"), "{err}");
    }

    #[test]
    fn untyped_topics_become_generic() {
        let raw = json!({"topic": "stamp.created", "id": "s1", "creator": "u1"});
        let event: DomainEvent = serde_json::from_value(raw).unwrap();
        let DomainEvent::Generic(g) = &event else {
            panic!("expected generic");
        };
        assert_eq!(g.topic, Topic::StampCreated);
        assert_eq!(g.fields["id"], "s1");
        assert!(!g.fields.contains_key("topic"));
    }

    #[test]
    fn missing_or_unknown_topic_fails() {
        assert!(serde_json::from_value::<DomainEvent>(json!({"a": 1})).is_err());
        assert!(serde_json::from_value::<DomainEvent>(json!({"topic": "nope"})).is_err());
        assert!(serde_json::from_value::<DomainEvent>(json!({"topic": 3})).is_err());
    }

    #[test]
    fn generic_rejects_typed_topics() {
        assert!(DomainEvent::generic(Topic::BotPing, Map::new()).is_err());
        assert!(DomainEvent::generic(Topic::ChannelRead, Map::new()).is_ok());
    }

    #[test]
    fn serializes_flat_with_topic() {
        let (bot_id, channel_id) = (Uuid::new_v4(), Uuid::new_v4());
        let event = DomainEvent::BotLeft(BotMembership { bot_id, channel_id });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["topic"], "bot.left");
        assert_eq!(value["bot_id"], json!(bot_id));

        let back: DomainEvent = serde_json::from_value(value).unwrap();
        assert!(matches!(back, DomainEvent::BotLeft(m) if m.channel_id == channel_id));
    }
}
