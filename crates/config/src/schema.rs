/// Config schema types (bus, bot dispatch, push delivery, engine, metrics).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    /// Public base URL of the chat service, used to build icon, badge and
    /// thumbnail links in push payloads.
    pub origin: String,
    pub bus: BusConfig,
    pub bots: BotsConfig,
    pub push: PushConfig,
    pub engine: EngineConfig,
    pub metrics: MetricsConfig,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".into(),
            bus: BusConfig::default(),
            bots: BotsConfig::default(),
            push: PushConfig::default(),
            engine: EngineConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// What `publish` does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for queue space. Events are never lost.
    #[default]
    Block,
    /// Drop the event for the full subscriber only.
    DropNewest,
}

/// Domain event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-subscriber queue capacity. Defaults to 100.
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Bot webhook dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotsConfig {
    pub enabled: bool,
    /// Deadline for a single webhook delivery. Defaults to 5 seconds.
    pub delivery_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delivery_timeout_secs: 5,
            user_agent: "herald-bot-dispatch".into(),
        }
    }
}

impl BotsConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

/// Push notification delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    /// Push relay endpoint. Required when `enabled` and not in dry-run mode.
    pub endpoint: Option<String>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Total send attempts per device token. Defaults to 5.
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Device tokens sent to concurrently for one event.
    pub max_concurrent_sends: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            api_key: None,
            max_attempts: 5,
            attempt_timeout_secs: 5,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            max_concurrent_sends: 16,
        }
    }
}

impl PushConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// The API key, if configured and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .filter(|k| !k.is_empty())
    }
}

/// Engine lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long shutdown waits for in-flight deliveries. Defaults to 10 seconds.
    pub drain_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: HeraldConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.bus.capacity, 100);
        assert_eq!(cfg.bus.overflow, OverflowPolicy::Block);
        assert_eq!(cfg.push.max_attempts, 5);
        assert_eq!(cfg.bots.delivery_timeout(), Duration::from_secs(5));
        assert!(cfg.push.api_key().is_none());
    }

    #[test]
    fn overflow_policy_parses_snake_case() {
        let cfg: HeraldConfig = toml::from_str("[bus]\noverflow = \"drop_newest\"\n").unwrap();
        assert_eq!(cfg.bus.overflow, OverflowPolicy::DropNewest);
    }

    #[test]
    fn api_key_is_redacted_when_serialized() {
        let cfg: HeraldConfig = toml::from_str("[push]\napi_key = \"s3cret\"\n").unwrap();
        assert_eq!(cfg.push.api_key(), Some("s3cret"));
        let out = toml::to_string(&cfg).unwrap();
        assert!(!out.contains("s3cret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let cfg: HeraldConfig = toml::from_str("[push]\napi_key = \"\"\n").unwrap();
        assert!(cfg.push.api_key().is_none());
    }
}
