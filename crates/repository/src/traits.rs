//! Storage contracts the dispatch engine depends on.
//!
//! Implementations must be safe to call concurrently from many delivery
//! tasks. Reads return snapshots; nothing here hands out live references.

use {
    async_trait::async_trait,
    herald_common::model::{
        Bot, BotEventLogEntry, BotId, BotState, Channel, ChannelId, FileId, FileMeta, TagId, User,
        UserId,
    },
};

use crate::Result;

#[async_trait]
pub trait BotRepository: Send + Sync {
    async fn get_bot(&self, id: BotId) -> Result<Bot>;
    /// Bots joined to `channel_id`.
    async fn get_bots_by_channel(&self, channel_id: ChannelId) -> Result<Vec<Bot>>;
    async fn get_all_bots(&self) -> Result<Vec<Bot>>;
    async fn change_bot_state(&self, id: BotId, state: BotState) -> Result<()>;
    /// Append-only.
    async fn write_bot_event_log(&self, entry: &BotEventLogEntry) -> Result<()>;
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, id: ChannelId) -> Result<Channel>;
    /// Slash-separated names from the root channel down, without a leading `#`.
    async fn get_channel_path(&self, id: ChannelId) -> Result<String>;
    async fn get_private_channel_member_ids(&self, id: ChannelId) -> Result<Vec<UserId>>;
    async fn get_subscribing_user_ids(&self, id: ChannelId) -> Result<Vec<UserId>>;
    async fn get_mute_user_ids(&self, id: ChannelId) -> Result<Vec<UserId>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<User>;
    /// Every user account, bots included.
    async fn get_users(&self) -> Result<Vec<User>>;
    async fn get_user_ids_by_tag_id(&self, tag_id: TagId) -> Result<Vec<UserId>>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn get_file_meta(&self, id: FileId) -> Result<FileMeta>;
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get_device_tokens_by_user_id(&self, user_id: UserId) -> Result<Vec<String>>;
    /// Forget a token the push gateway rejected. Unknown tokens are not an
    /// error.
    async fn unregister_device(&self, token: &str) -> Result<()>;
}

/// Everything the dispatch engine reads or writes.
pub trait Repository:
    BotRepository + ChannelRepository + UserRepository + FileRepository + DeviceRepository
{
}

impl<T> Repository for T where
    T: BotRepository + ChannelRepository + UserRepository + FileRepository + DeviceRepository
{
}
