use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EventError;

macro_rules! topics {
    ($($variant:ident => $name:literal,)+) => {
        /// Every domain event topic the chat backend publishes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Topic {
            $($variant,)+
        }

        impl Topic {
            pub const ALL: &'static [Topic] = &[$(Self::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

topics! {
    UserCreated => "user.created",
    UserUpdated => "user.updated",
    UserIconUpdated => "user.icon_updated",
    UserOnline => "user.online",
    UserOffline => "user.offline",
    UserTagAdded => "user_tag.added",
    UserTagUpdated => "user_tag.updated",
    UserTagRemoved => "user_tag.deleted",
    UserGroupCreated => "user_group.created",
    UserGroupDeleted => "user_group.deleted",
    UserGroupMemberAdded => "user_group.member.added",
    UserGroupMemberRemoved => "user_group.member.removed",
    MessageCreated => "message.created",
    MessageUpdated => "message.updated",
    MessageDeleted => "message.deleted",
    MessageStamped => "message.stamped",
    MessageUnstamped => "message.unstamped",
    MessagePinned => "message.pinned",
    MessageUnpinned => "message.unpinned",
    ChannelCreated => "channel.created",
    ChannelUpdated => "channel.updated",
    ChannelTopicUpdated => "channel.topic.updated",
    ChannelDeleted => "channel.deleted",
    ChannelRead => "channel.read",
    ChannelStared => "channel.stared",
    ChannelUnstared => "channel.unstared",
    ChannelViewersChanged => "channel.viewers_changed",
    StampCreated => "stamp.created",
    StampUpdated => "stamp.updated",
    StampDeleted => "stamp.deleted",
    StampPaletteCreated => "stamp_palette.created",
    StampPaletteUpdated => "stamp_palette.updated",
    StampPaletteDeleted => "stamp_palette.deleted",
    WebhookCreated => "webhook.created",
    WebhookUpdated => "webhook.updated",
    WebhookDeleted => "webhook.deleted",
    BotCreated => "bot.created",
    BotUpdated => "bot.updated",
    BotDeleted => "bot.deleted",
    BotStateChanged => "bot.state_changed",
    BotPing => "bot.ping",
    BotJoined => "bot.joined",
    BotLeft => "bot.left",
    UserWebRtcStateChanged => "user.webrtc.state_changed",
    SseConnected => "sse.connected",
    SseDisconnected => "sse.disconnected",
    WsConnected => "ws.connected",
    WsDisconnected => "ws.disconnected",
    ClipFolderCreated => "clip_folder.created",
    ClipFolderUpdated => "clip_folder.updated",
    ClipFolderDeleted => "clip_folder.deleted",
    ClipFolderMessageDeleted => "clip_folder_message.deleted",
    ClipFolderMessageAdded => "clip_folder_message.added",
}

impl Topic {
    /// Whether events on this topic have a typed [`DomainEvent`] variant.
    ///
    /// [`DomainEvent`]: crate::DomainEvent
    pub fn is_typed(self) -> bool {
        matches!(
            self,
            Self::MessageCreated
                | Self::ChannelCreated
                | Self::UserCreated
                | Self::BotPing
                | Self::BotJoined
                | Self::BotLeft
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::unknown_topic(s))
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
