//! Declarative description of a chat "world" used to seed [`MemoryRepository`].
//!
//! [`MemoryRepository`]: crate::MemoryRepository

use std::path::Path;

use {
    anyhow::Context,
    herald_common::model::{Bot, Channel, FileMeta, TagId, User, UserId},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub users: Vec<User>,
    pub channels: Vec<ChannelFixture>,
    pub bots: Vec<Bot>,
    pub tags: Vec<TagFixture>,
    pub files: Vec<FileMeta>,
    pub devices: Vec<DeviceFixture>,
}

/// A channel plus its membership lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFixture {
    #[serde(flatten)]
    pub channel: Channel,
    /// Members of a private channel. Ignored for public channels.
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default)]
    pub subscribers: Vec<UserId>,
    #[serde(default)]
    pub mutes: Vec<UserId>,
}

impl From<Channel> for ChannelFixture {
    fn from(channel: Channel) -> Self {
        Self {
            channel,
            members: Vec::new(),
            subscribers: Vec::new(),
            mutes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagFixture {
    pub id: TagId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub users: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFixture {
    pub user_id: UserId,
    pub token: String,
}

impl Fixture {
    /// Load a fixture from a `.json`, `.toml`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let fixture = match ext {
            "json" => serde_json::from_str(&raw)?,
            "toml" => toml::from_str(&raw)?,
            "yaml" | "yml" => serde_yaml::from_str(&raw)?,
            _ => anyhow::bail!("unsupported fixture format: .{ext}"),
        };
        Ok(fixture)
    }
}
