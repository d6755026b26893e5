//! In-memory repository backed by `HashMap`s. No persistence; used by the
//! replay CLI and tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use {
    async_trait::async_trait,
    herald_common::model::{
        Bot, BotEventLogEntry, BotId, BotState, Channel, ChannelId, FileId, FileMeta, TagId, User,
        UserId,
    },
    tracing::debug,
};

use crate::{
    Result, StorageError,
    fixture::Fixture,
    traits::{BotRepository, ChannelRepository, DeviceRepository, FileRepository, UserRepository},
};

/// Deepest channel nesting followed when building a path.
const MAX_CHANNEL_DEPTH: usize = 64;

struct ChannelEntry {
    channel: Channel,
    members: Vec<UserId>,
    subscribers: Vec<UserId>,
    mutes: Vec<UserId>,
}

#[derive(Default)]
struct World {
    users: HashMap<UserId, User>,
    channels: HashMap<ChannelId, ChannelEntry>,
    bots: HashMap<BotId, Bot>,
    tags: HashMap<TagId, Vec<UserId>>,
    files: HashMap<FileId, FileMeta>,
    /// Insertion-ordered `(user, token)` pairs.
    devices: Vec<(UserId, String)>,
}

#[derive(Default)]
pub struct MemoryRepository {
    world: Mutex<World>,
    event_logs: Mutex<Vec<BotEventLogEntry>>,
    state_changes: Mutex<Vec<(BotId, BotState)>>,
    failing: Mutex<HashSet<&'static str>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let repo = Self::new();
        {
            let mut world = lock(&repo.world);
            world.users = fixture.users.into_iter().map(|u| (u.id, u)).collect();
            world.bots = fixture.bots.into_iter().map(|b| (b.id, b)).collect();
            world.files = fixture.files.into_iter().map(|f| (f.id, f)).collect();
            world.tags = fixture.tags.into_iter().map(|t| (t.id, t.users)).collect();
            world.devices = fixture
                .devices
                .into_iter()
                .map(|d| (d.user_id, d.token))
                .collect();
            world.channels = fixture
                .channels
                .into_iter()
                .map(|c| {
                    (c.channel.id, ChannelEntry {
                        channel: c.channel,
                        members: c.members,
                        subscribers: c.subscribers,
                        mutes: c.mutes,
                    })
                })
                .collect();
            debug!(
                users = world.users.len(),
                channels = world.channels.len(),
                bots = world.bots.len(),
                devices = world.devices.len(),
                "loaded fixture into memory repository"
            );
        }
        repo
    }

    /// Make every call of `operation` (a trait method name, e.g.
    /// `"write_bot_event_log"`) fail with a backend error.
    pub fn fail_operation(&self, operation: &'static str) {
        lock(&self.failing).insert(operation);
    }

    pub fn insert_bot(&self, bot: Bot) {
        lock(&self.world).bots.insert(bot.id, bot);
    }

    pub fn add_device(&self, user_id: UserId, token: impl Into<String>) {
        lock(&self.world).devices.push((user_id, token.into()));
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    pub fn bot_state(&self, id: BotId) -> Option<BotState> {
        lock(&self.world).bots.get(&id).map(|b| b.state)
    }

    pub fn event_logs(&self) -> Vec<BotEventLogEntry> {
        lock(&self.event_logs).clone()
    }

    /// Every `change_bot_state` call, in order.
    pub fn state_changes(&self) -> Vec<(BotId, BotState)> {
        lock(&self.state_changes).clone()
    }

    pub fn device_tokens(&self, user_id: UserId) -> Vec<String> {
        tokens_of(&lock(&self.world), user_id)
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if lock(&self.failing).contains(operation) {
            return Err(StorageError::backend(format!("{operation} failed")));
        }
        Ok(())
    }

    fn with_channel<T>(&self, id: ChannelId, f: impl FnOnce(&ChannelEntry) -> T) -> Result<T> {
        let world = lock(&self.world);
        world
            .channels
            .get(&id)
            .map(f)
            .ok_or_else(|| StorageError::not_found("channel", id))
    }
}

fn tokens_of(world: &World, user_id: UserId) -> Vec<String> {
    world
        .devices
        .iter()
        .filter(|(u, _)| *u == user_id)
        .map(|(_, t)| t.clone())
        .collect()
}

#[async_trait]
impl BotRepository for MemoryRepository {
    async fn get_bot(&self, id: BotId) -> Result<Bot> {
        self.check("get_bot")?;
        lock(&self.world)
            .bots
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("bot", id))
    }

    async fn get_bots_by_channel(&self, channel_id: ChannelId) -> Result<Vec<Bot>> {
        self.check("get_bots_by_channel")?;
        Ok(lock(&self.world)
            .bots
            .values()
            .filter(|b| b.is_member_of(channel_id))
            .cloned()
            .collect())
    }

    async fn get_all_bots(&self) -> Result<Vec<Bot>> {
        self.check("get_all_bots")?;
        Ok(lock(&self.world).bots.values().cloned().collect())
    }

    async fn change_bot_state(&self, id: BotId, state: BotState) -> Result<()> {
        self.check("change_bot_state")?;
        {
            let mut world = lock(&self.world);
            let bot = world
                .bots
                .get_mut(&id)
                .ok_or_else(|| StorageError::not_found("bot", id))?;
            bot.state = state;
        }
        lock(&self.state_changes).push((id, state));
        Ok(())
    }

    async fn write_bot_event_log(&self, entry: &BotEventLogEntry) -> Result<()> {
        self.check("write_bot_event_log")?;
        lock(&self.event_logs).push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl ChannelRepository for MemoryRepository {
    async fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        self.check("get_channel")?;
        self.with_channel(id, |e| e.channel.clone())
    }

    async fn get_channel_path(&self, id: ChannelId) -> Result<String> {
        self.check("get_channel_path")?;
        let world = lock(&self.world);
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            if names.len() == MAX_CHANNEL_DEPTH {
                return Err(StorageError::backend(format!(
                    "channel {id} nests deeper than {MAX_CHANNEL_DEPTH} levels"
                )));
            }
            let entry = world
                .channels
                .get(&cid)
                .ok_or_else(|| StorageError::not_found("channel", cid))?;
            names.push(entry.channel.name.as_str());
            current = entry.channel.parent_id;
        }
        names.reverse();
        Ok(names.join("/"))
    }

    async fn get_private_channel_member_ids(&self, id: ChannelId) -> Result<Vec<UserId>> {
        self.check("get_private_channel_member_ids")?;
        self.with_channel(id, |e| {
            if e.channel.is_public {
                Vec::new()
            } else {
                e.members.clone()
            }
        })
    }

    async fn get_subscribing_user_ids(&self, id: ChannelId) -> Result<Vec<UserId>> {
        self.check("get_subscribing_user_ids")?;
        self.with_channel(id, |e| e.subscribers.clone())
    }

    async fn get_mute_user_ids(&self, id: ChannelId) -> Result<Vec<UserId>> {
        self.check("get_mute_user_ids")?;
        self.with_channel(id, |e| e.mutes.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn get_user(&self, id: UserId) -> Result<User> {
        self.check("get_user")?;
        lock(&self.world)
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("user", id))
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        self.check("get_users")?;
        Ok(lock(&self.world).users.values().cloned().collect())
    }

    async fn get_user_ids_by_tag_id(&self, tag_id: TagId) -> Result<Vec<UserId>> {
        self.check("get_user_ids_by_tag_id")?;
        Ok(lock(&self.world)
            .tags
            .get(&tag_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FileRepository for MemoryRepository {
    async fn get_file_meta(&self, id: FileId) -> Result<FileMeta> {
        self.check("get_file_meta")?;
        lock(&self.world)
            .files
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("file", id))
    }
}

#[async_trait]
impl DeviceRepository for MemoryRepository {
    async fn get_device_tokens_by_user_id(&self, user_id: UserId) -> Result<Vec<String>> {
        self.check("get_device_tokens_by_user_id")?;
        Ok(tokens_of(&lock(&self.world), user_id))
    }

    async fn unregister_device(&self, token: &str) -> Result<()> {
        self.check("unregister_device")?;
        lock(&self.world).devices.retain(|(_, t)| t != token);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::fixture::{ChannelFixture, DeviceFixture, TagFixture},
        uuid::Uuid,
    };

    fn channel(name: &str, parent: Option<ChannelId>, public: bool) -> Channel {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "name": name,
            "parent_id": parent,
            "is_public": public,
        }))
        .unwrap()
    }

    fn bot(channels: &[ChannelId]) -> Bot {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "bot_user_id": Uuid::new_v4(),
            "creator_id": Uuid::new_v4(),
            "display_name": "bot",
            "webhook_url": "http://bot.invalid/hook",
            "channel_ids": channels,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn channel_path_follows_parents() {
        let root = channel("team", None, true);
        let child = channel("dev", Some(root.id), true);
        let leaf = channel("rust", Some(child.id), true);
        let leaf_id = leaf.id;
        let repo = MemoryRepository::from_fixture(Fixture {
            channels: vec![root.into(), child.into(), leaf.into()],
            ..Default::default()
        });
        assert_eq!(repo.get_channel_path(leaf_id).await.unwrap(), "team/dev/rust");
    }

    #[tokio::test]
    async fn missing_channel_is_not_found() {
        let repo = MemoryRepository::new();
        let err = repo.get_channel(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn private_members_only_for_private_channels() {
        let member = Uuid::new_v4();
        let public = channel("open", None, true);
        let private = channel("secret", None, false);
        let (public_id, private_id) = (public.id, private.id);
        let repo = MemoryRepository::from_fixture(Fixture {
            channels: vec![
                ChannelFixture {
                    members: vec![member],
                    ..ChannelFixture::from(public)
                },
                ChannelFixture {
                    members: vec![member],
                    ..ChannelFixture::from(private)
                },
            ],
            ..Default::default()
        });
        assert!(
            repo.get_private_channel_member_ids(public_id)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            repo.get_private_channel_member_ids(private_id)
                .await
                .unwrap(),
            vec![member]
        );
    }

    #[tokio::test]
    async fn bots_by_channel_uses_membership() {
        let ch = Uuid::new_v4();
        let joined = bot(&[ch]);
        let other = bot(&[]);
        let joined_id = joined.id;
        let repo = MemoryRepository::from_fixture(Fixture {
            bots: vec![joined, other],
            ..Default::default()
        });
        let bots = repo.get_bots_by_channel(ch).await.unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].id, joined_id);
        assert_eq!(repo.get_all_bots().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn state_changes_are_recorded() {
        let b = bot(&[]);
        let id = b.id;
        let repo = MemoryRepository::new();
        repo.insert_bot(b);
        repo.change_bot_state(id, BotState::Active).await.unwrap();
        assert_eq!(repo.bot_state(id), Some(BotState::Active));
        assert_eq!(repo.state_changes(), vec![(id, BotState::Active)]);
        assert!(
            repo.change_bot_state(Uuid::new_v4(), BotState::Paused)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unregister_removes_only_that_token() {
        let user = Uuid::new_v4();
        let repo = MemoryRepository::from_fixture(Fixture {
            devices: vec![
                DeviceFixture {
                    user_id: user,
                    token: "a".into(),
                },
                DeviceFixture {
                    user_id: user,
                    token: "b".into(),
                },
            ],
            ..Default::default()
        });
        repo.unregister_device("a").await.unwrap();
        repo.unregister_device("missing").await.unwrap();
        assert_eq!(
            repo.get_device_tokens_by_user_id(user).await.unwrap(),
            vec!["b".to_string()]
        );
    }

    #[tokio::test]
    async fn tags_resolve_to_users() {
        let (tag, user) = (Uuid::new_v4(), Uuid::new_v4());
        let repo = MemoryRepository::from_fixture(Fixture {
            tags: vec![TagFixture {
                id: tag,
                name: "oncall".into(),
                users: vec![user],
            }],
            ..Default::default()
        });
        assert_eq!(repo.get_user_ids_by_tag_id(tag).await.unwrap(), vec![user]);
        assert!(
            repo.get_user_ids_by_tag_id(Uuid::new_v4())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn injected_failures_surface_as_backend_errors() {
        let repo = MemoryRepository::new();
        repo.fail_operation("get_all_bots");
        let err = repo.get_all_bots().await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
    }
}
