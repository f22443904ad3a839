pub mod chat;
pub mod config_cmd;
pub mod listen;
pub mod models;
pub mod monitor;

use std::path::Path;

use anyhow::Context;
use meshbridge_config::AppConfig;
use meshbridge_core::channel::ChannelSelector;

/// Load configuration, letting a `--channel` flag win over file and env.
pub fn load_config(path: Option<&Path>, channel: Option<i64>) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load_with_overrides(path),
        None => AppConfig::load(),
    }
    .context("Failed to load config")?;

    if let Some(channel) = channel {
        config.channel = ChannelSelector::try_from(channel).map_err(anyhow::Error::msg)?;
    }

    Ok(config)
}
