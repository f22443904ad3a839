//! `meshbridge config`: Configuration helpers.

use std::path::Path;

use clap::Subcommand;
use meshbridge_config::AppConfig;

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print a config file with every default filled in
    Default,
    /// Print the effective configuration after file and environment overrides
    Show,
    /// Print where the config file is read from
    Path,
}

pub fn run(action: Option<ConfigAction>, path: Option<&Path>) -> anyhow::Result<()> {
    match action.unwrap_or(ConfigAction::Default) {
        ConfigAction::Default => print!("{}", AppConfig::default_toml()),
        ConfigAction::Show => {
            let config = super::load_config(path, None)?;
            print!("{}", render_effective(&config)?);
        }
        ConfigAction::Path => {
            let resolved = path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
            println!("{}", resolved.display());
        }
    }
    Ok(())
}

/// Serialize the configuration with the API key masked.
fn render_effective(config: &AppConfig) -> anyhow::Result<String> {
    let mut config = config.clone();
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    Ok(toml::to_string_pretty(&config)?)
}
