//! Configuration management
//!
//! Settings come from an optional TOML file and environment overrides and are
//! shared through a process-wide holder. Validation limits on batches are fixed
//! constants in `core::batch`, not configuration.

pub mod settings;

pub use settings::{Config, Settings, GLOBAL_CONFIG};
