//! `meshbridge models`: list the models the configured backend offers.

use anyhow::Context;
use meshbridge_config::AppConfig;
use meshbridge_core::error::GenerationError;
use meshbridge_core::provider::Provider;
use meshbridge_providers::build_provider;
use tracing::warn;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let provider =
        build_provider(&config.provider).context("Failed to build generation provider")?;

    let lines = listing(provider.as_ref(), &config.model)
        .await
        .with_context(|| format!("Failed to list models from {}", provider.name()))?;

    println!("Models on {} ({}):", provider.name(), config.provider.resolved_base_url());
    for line in &lines {
        println!("{line}");
    }
    Ok(())
}

/// One line per available model, the configured one marked with `*`.
async fn listing(
    provider: &dyn Provider,
    configured: &str,
) -> Result<Vec<String>, GenerationError> {
    let mut models = provider.list_models().await?;
    models.sort();

    if !models.iter().any(|m| m == configured) {
        warn!(model = configured, "Configured model is not offered by the backend");
    }

    Ok(models
        .into_iter()
        .map(|m| {
            let marker = if m == configured { '*' } else { ' ' };
            format!("  {marker} {m}")
        })
        .collect())
}
