//! Text-generation backends for meshbridge.
//!
//! All providers implement the `meshbridge_core::Provider` trait.
//! [`build_provider`] picks one from configuration.

mod lines;
pub mod ollama;
pub mod openai_compat;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;

use meshbridge_config::{ProviderConfig, ProviderKind};
use meshbridge_core::error::GenerationError;
use meshbridge_core::provider::Provider;

/// Build the configured provider.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>, GenerationError> {
    let base_url = config.resolved_base_url();
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(&base_url, timeout)?),
        ProviderKind::Openai => Arc::new(OpenAiCompatProvider::new(
            "openai",
            &base_url,
            config.api_key.clone().unwrap_or_default(),
            timeout,
        )?),
    };

    tracing::debug!(provider = provider.name(), base_url = %base_url, "Built generation provider");
    Ok(provider)
}

/// Shared HTTP client construction.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GenerationError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Map a reqwest transport failure onto the generation taxonomy.
pub(crate) fn map_send_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(e.to_string())
    } else {
        GenerationError::Network(e.to_string())
    }
}
