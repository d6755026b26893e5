//! Shared types, error definitions, and the domain model used across all herald crates.

pub mod error;
pub mod model;

pub use error::{Error, Result};
