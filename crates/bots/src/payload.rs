//! JSON bodies sent to bot webhooks.
//!
//! Every body is an [`Envelope`] around a topic-specific payload. Bodies are
//! encoded once per event and the same buffer is handed to every bot.

use {
    bytes::Bytes,
    chrono::{DateTime, Utc},
    herald_common::model::{
        BotEventType, Channel, ChannelId, EmbeddedRef, Message, MessageId, User, UserId,
    },
    serde::Serialize,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<'a, P> {
    pub event_type: BotEventType,
    pub event_time: DateTime<Utc>,
    pub payload: &'a P,
}

/// Encode `payload` in an envelope stamped with the current time.
pub fn encode<P: Serialize>(event_type: BotEventType, payload: &P) -> serde_json::Result<Bytes> {
    let envelope = Envelope {
        event_type,
        event_time: Utc::now(),
        payload,
    };
    serde_json::to_vec(&envelope).map(Bytes::from)
}

#[derive(Debug, Serialize)]
pub struct PingPayload {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPayload {
    pub channel_id: ChannelId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload<'a> {
    pub id: MessageId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub text: &'a str,
    pub plain_text: &'a str,
    pub embedded: &'a [EmbeddedRef],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> MessagePayload<'a> {
    pub fn new(message: &'a Message, embedded: &'a [EmbeddedRef], plain: &'a str) -> Self {
        Self {
            id: message.id,
            user_id: message.user_id,
            channel_id: message.channel_id,
            text: &message.text,
            plain_text: plain,
            embedded,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageCreatedPayload<'a> {
    pub message: MessagePayload<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPayload<'a> {
    pub id: ChannelId,
    pub name: &'a str,
    /// `#`-prefixed full path.
    pub path: String,
    pub parent_id: Option<ChannelId>,
    pub creator_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> ChannelPayload<'a> {
    pub fn new(channel: &'a Channel, path: &str) -> Self {
        Self {
            id: channel.id,
            name: &channel.name,
            path: format!("#{path}"),
            parent_id: channel.parent_id,
            creator_id: channel.creator_id,
            created_at: channel.created_at,
            updated_at: channel.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelCreatedPayload<'a> {
    pub channel: ChannelPayload<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload<'a> {
    pub id: UserId,
    pub name: &'a str,
    pub display_name: &'a str,
    pub bot: bool,
}

impl<'a> From<&'a User> for UserPayload<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            name: &user.name,
            display_name: user.display_or_name(),
            bot: user.bot,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserCreatedPayload<'a> {
    pub user: UserPayload<'a>,
}
