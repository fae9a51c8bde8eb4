//! Warden server binary support: HTTP routes and configuration loading.

pub mod server;

use anyhow::Context;
use std::path::Path;
use warden_core::WardenConfig;

/// Config file read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "warden.toml";

/// Loads configuration from `path`, or from [`DEFAULT_CONFIG_PATH`] if it
/// exists, or falls back to defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<WardenConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
        None => return Ok(WardenConfig::default()),
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}
