//! Configuration loading, validation, and env substitution.
//!
//! Config files: `herald.toml`, `herald.yaml`, or `herald.json`
//! Searched in `./` then `~/.config/herald/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_config_value},
    schema::{
        BotsConfig, BusConfig, EngineConfig, HeraldConfig, MetricsConfig, OverflowPolicy,
        PushConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
