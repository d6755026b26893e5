//! Repository contracts for bots, channels, users, files and devices, with an
//! in-memory implementation seeded from fixtures.

pub mod error;
pub mod fixture;
pub mod memory;
pub mod traits;

pub use {
    error::{Result, StorageError},
    fixture::{ChannelFixture, DeviceFixture, Fixture, TagFixture},
    memory::MemoryRepository,
    traits::{
        BotRepository, ChannelRepository, DeviceRepository, FileRepository, Repository,
        UserRepository,
    },
};
