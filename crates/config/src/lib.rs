//! Configuration loading, validation, and management for meshbridge.
//!
//! Loads configuration from `~/.meshbridge/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use meshbridge_core::ChannelSelector;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// The persona the relay answers with unless configured otherwise.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an unhelpful AI assistant responding to shitposts at a hacker convention sent over the radio.
You will respond briefly, without yapping, as this goes over text over radio.
Puns, emoji, sarcasm, and ascii art are appreciated, but use them sparingly. Shitposts are expected.
Keep responses to 500 characters or less. Don't mention that you're using puns, ascii art, emojis or shitposts.
";

/// The root configuration structure.
///
/// Maps directly to `~/.meshbridge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Channel to answer on; `-1` answers on every channel
    #[serde(default)]
    pub channel: ChannelSelector,

    /// Model name passed to the generation backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Fixed system instruction prepended to every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Generation backend connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// How replies are requested
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Per-sender history settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Radio transport settings
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_model() -> String {
    "deepseek-r1:8b".into()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

/// Which generation backend API to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama's native `/api/chat` and `/api/generate`
    #[default]
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint
    Openai,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL; defaults depend on `kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP timeout for a single generation call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// The configured base URL, or the well-known default for the kind.
    pub fn resolved_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| match self.kind {
            ProviderKind::Ollama => "http://localhost:11434".into(),
            ProviderKind::Openai => "https://api.openai.com/v1".into(),
        })
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Whether replies come from a role-tagged chat or a single-shot prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Chat,
    Generate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub mode: GenerationMode,

    /// Stream the reply and concatenate the pieces before sending
    #[serde(default)]
    pub stream: bool,

    /// Let reasoning models emit their thinking (it would be sent over the air)
    #[serde(default)]
    pub think: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum turns kept per sender
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Maximum number of senders tracked; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
}

fn default_history_cap() -> usize {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            max_sessions: None,
        }
    }
}

/// Line format spoken by the stdio transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// One JSON packet per line
    #[default]
    Json,
    /// One plain text message per line
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Largest frame the radio accepts, in characters
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    #[serde(default)]
    pub format: WireFormat,

    /// Channel assigned to plain text lines
    #[serde(default)]
    pub text_channel: u32,

    /// Sender assigned to plain text lines
    #[serde(default = "default_text_sender")]
    pub text_sender: String,
}

fn default_max_frame_len() -> usize {
    200
}
fn default_text_sender() -> String {
    "console".into()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_len: default_max_frame_len(),
            format: WireFormat::default(),
            text_channel: 0,
            text_sender: default_text_sender(),
        }
    }
}

impl TransportConfig {
    /// The frame limit as a non-zero length. Validation guarantees this is `Some`.
    pub fn frame_len(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_frame_len)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.meshbridge/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `MESHBRIDGE_MODEL`
    /// - `MESHBRIDGE_CHANNEL`
    /// - `MESHBRIDGE_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `OLLAMA_HOST`
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(model) = var("MESHBRIDGE_MODEL") {
            self.model = model;
        }

        if let Some(channel) = var("MESHBRIDGE_CHANNEL") {
            let value: i64 = channel.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("MESHBRIDGE_CHANNEL is not an integer: {channel}"))
            })?;
            self.channel = ChannelSelector::try_from(value).map_err(ConfigError::ValidationError)?;
        }

        if self.provider.api_key.is_none() {
            self.provider.api_key = var("MESHBRIDGE_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }

        if self.provider.kind == ProviderKind::Ollama && self.provider.base_url.is_none() {
            if let Some(host) = var("OLLAMA_HOST") {
                self.provider.base_url = Some(normalize_ollama_host(&host));
            }
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".meshbridge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.max_frame_len == 0 {
            return Err(ConfigError::ValidationError(
                "transport.max_frame_len must be greater than 0".into(),
            ));
        }

        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "generation.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.session.max_sessions == Some(0) {
            return Err(ConfigError::ValidationError(
                "session.max_sessions must be greater than 0 when set".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channel: ChannelSelector::default(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            provider: ProviderConfig::default(),
            generation: GenerationConfig::default(),
            session: SessionConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// `OLLAMA_HOST` may be a bare `host:port`.
fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
