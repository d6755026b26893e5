//! Domain records the dispatch engine reads from (and writes back to) the
//! chat backend's storage.

use std::{collections::HashSet, fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::error::Error;

pub type UserId = Uuid;
pub type ChannelId = Uuid;
pub type BotId = Uuid;
pub type TagId = Uuid;
pub type FileId = Uuid;
pub type MessageId = Uuid;

// ── Bots ────────────────────────────────────────────────────────────────────

/// Health state of a bot integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    /// Set by bot lifecycle management; never entered by dispatch.
    #[default]
    Inactive,
    Active,
    Paused,
}

impl BotState {
    /// The state a bot moves to after a ping delivery attempt.
    ///
    /// This is the only transition the dispatch engine performs.
    #[must_use]
    pub fn after_ping(delivered: bool) -> Self {
        if delivered { Self::Active } else { Self::Paused }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event names as bots see them (webhook header value and subscription key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotEventType {
    Ping,
    Joined,
    Left,
    MessageCreated,
    ChannelCreated,
    UserCreated,
}

impl BotEventType {
    pub const ALL: &'static [BotEventType] = &[
        Self::Ping,
        Self::Joined,
        Self::Left,
        Self::MessageCreated,
        Self::ChannelCreated,
        Self::UserCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Joined => "JOINED",
            Self::Left => "LEFT",
            Self::MessageCreated => "MESSAGE_CREATED",
            Self::ChannelCreated => "CHANNEL_CREATED",
            Self::UserCreated => "USER_CREATED",
        }
    }
}

impl fmt::Display for BotEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::unknown_name("bot event", s))
    }
}

/// A registered bot integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    /// User account the bot posts as.
    pub bot_user_id: UserId,
    pub creator_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: BotState,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub subscribe_events: HashSet<BotEventType>,
    pub webhook_url: String,
    #[serde(default)]
    pub verification_token: String,
    /// Channels the bot was joined to when this record was read.
    #[serde(default)]
    pub channel_ids: HashSet<ChannelId>,
}

impl Bot {
    pub fn subscribes(&self, event: BotEventType) -> bool {
        self.subscribe_events.contains(&event)
    }

    pub fn is_member_of(&self, channel_id: ChannelId) -> bool {
        self.channel_ids.contains(&channel_id)
    }
}

/// Audit record of one webhook delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotEventLogEntry {
    pub request_id: Uuid,
    pub bot_id: BotId,
    pub event: BotEventType,
    pub body: String,
    pub status: Option<u16>,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

// ── Channels, users, files ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<ChannelId>,
    #[serde(default)]
    pub creator_id: Option<UserId>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    /// Every non-bot user is notified, mutes are ignored.
    #[serde(default)]
    pub is_forced: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique handle.
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name, or the handle when no display name is set.
    pub fn display_or_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: FileId,
    pub name: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub has_thumbnail: bool,
}

// ── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Kind of an embedded reference found in message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    User,
    Tag,
    File,
    Channel,
    Group,
    #[serde(other)]
    Other,
}

/// A typed reference extracted from raw message text by the embedded-entity
/// parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedRef {
    pub raw: String,
    #[serde(rename = "type")]
    pub kind: RefKind,
    /// Left unparsed: producers do not validate it.
    pub id: String,
}

impl EmbeddedRef {
    /// The referenced id, or `None` when it is not a valid UUID.
    pub fn uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }
}

fn default_true() -> bool {
    true
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_transition() {
        assert_eq!(BotState::after_ping(true), BotState::Active);
        assert_eq!(BotState::after_ping(false), BotState::Paused);
    }

    #[test]
    fn bot_event_names_round_trip_through_from_str() {
        for event in BotEventType::ALL {
            assert_eq!(event.as_str().parse::<BotEventType>().unwrap(), *event);
        }
        assert!("NOPE".parse::<BotEventType>().is_err());
    }

    #[test]
    fn bot_event_serde_matches_as_str() {
        let json = serde_json::to_string(&BotEventType::MessageCreated).unwrap();
        assert_eq!(json, "\"MESSAGE_CREATED\"");
    }

    #[test]
    fn unknown_ref_kind_deserializes_as_other() {
        let r: EmbeddedRef =
            serde_json::from_str(r#"{"raw":"x","type":"stamp","id":"abc"}"#).unwrap();
        assert_eq!(r.kind, RefKind::Other);
        assert!(r.uuid().is_none());
    }

    #[test]
    fn display_name_falls_back_to_handle() {
        let mut user = User {
            id: Uuid::new_v4(),
            name: "alice".into(),
            display_name: String::new(),
            bot: false,
            created_at: Utc::now(),
        };
        assert_eq!(user.display_or_name(), "alice");
        user.display_name = "Alice A.".into();
        assert_eq!(user.display_or_name(), "Alice A.");
    }

    #[test]
    fn channel_defaults_to_public() {
        let ch: Channel = serde_json::from_str(&format!(
            r#"{{"id":"{}","name":"general"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert!(ch.is_public);
        assert!(!ch.is_forced);
    }
}
