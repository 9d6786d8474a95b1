#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::conversation::ConversationConfig;
use crate::embeddings::chunking::ChunkingConfig;
use crate::ollama::GenerationOptions;
use crate::prompt::{DEFAULT_PERSONA, PersonaConfig, PersonaTable, default_personas};
use crate::rag::RagConfig;
use crate::stream::MAX_ATTEMPTS_LIMIT;
use crate::server::ServerConfig;
use crate::stream::RelayConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_persona_name")]
    pub default_persona: String,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub conversations: ConversationConfig,
    #[serde(default = "default_personas")]
    pub personas: Vec<PersonaConfig>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_persona_name() -> String {
    DEFAULT_PERSONA.to_string()
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            default_persona: default_persona_name(),
            ollama: OllamaConfig::default(),
            relay: RelayConfig::default(),
            generation: GenerationOptions::default(),
            chunking: ChunkingConfig::default(),
            rag: RagConfig::default(),
            server: ServerConfig::default(),
            conversations: ConversationConfig::default(),
            personas: default_personas(),
            base_dir: Config::config_dir().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Generation model used when a persona does not name one
    pub model: String,
    pub embedding_model: String,
    pub batch_size: u32,
    pub keep_alive: String,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "llama2".to_string(),
            embedding_model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            keep_alive: "10m".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid max attempts: {0} (must be between 1 and 10)")]
    InvalidMaxAttempts(u32),
    #[error("Invalid {name} timeout: {value} seconds (must be between {min} and {max})")]
    InvalidTimeout {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("Invalid max line size: {0} bytes (must be between 1 KiB and 64 MiB)")]
    InvalidMaxLineBytes(usize),
    #[error("Invalid chunk window: {0} (must be between 10 and 100000 characters)")]
    InvalidWindowSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than the window ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid similarity threshold: {0} (must be between -1.0 and 1.0)")]
    InvalidSimilarityThreshold(f32),
    #[error("Invalid result limit: {0} (must be between 1 and 100)")]
    InvalidResultLimit(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid top_p: {0} (must be between 0.0 and 1.0)")]
    InvalidTopP(f32),
    #[error("Invalid context size: {0} (must be at least 1)")]
    InvalidContextSize(u32),
    #[error("Invalid conversation capacity: {0} (must be at least 1)")]
    InvalidConversationCapacity(usize),
    #[error("Invalid messages per conversation: {0} (must be at least 2)")]
    InvalidMaxMessages(usize),
    #[error("Persona names cannot be empty")]
    EmptyPersonaName,
    #[error("Persona '{0}' is defined more than once")]
    DuplicatePersona(String),
    #[error("Default persona '{0}' is not defined")]
    UnknownDefaultPersona(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default configuration directory: `~/.llm-relay`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".llm-relay"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("llm-relay"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    /// Build the persona lookup table, validating names and the default.
    #[inline]
    pub fn persona_table(&self) -> Result<PersonaTable, ConfigError> {
        PersonaTable::new(self.personas.clone(), &self.default_persona)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_relay_config()?;
        self.validate_generation_config()?;
        self.validate_chunking_config()?;
        self.validate_rag_config()?;
        self.validate_service_config()?;
        self.persona_table()?;
        Ok(())
    }

    fn validate_relay_config(&self) -> Result<(), ConfigError> {
        let relay = &self.relay;

        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&relay.max_attempts) {
            return Err(ConfigError::InvalidMaxAttempts(relay.max_attempts));
        }

        let timeouts = [
            ("connect", relay.connect_timeout_seconds, 1, 300),
            ("total", relay.total_timeout_seconds, 1, 3600),
            ("read", relay.read_timeout_seconds, 1, 600),
            ("idle", relay.idle_timeout_seconds, 1, 600),
            ("retry backoff", relay.retry_backoff_seconds, 0, 60),
        ];
        for (name, value, min, max) in timeouts {
            if !(min..=max).contains(&value) {
                return Err(ConfigError::InvalidTimeout {
                    name,
                    value,
                    min,
                    max,
                });
            }
        }

        if !(1024..=64 * 1024 * 1024).contains(&relay.max_line_bytes) {
            return Err(ConfigError::InvalidMaxLineBytes(relay.max_line_bytes));
        }

        Ok(())
    }

    fn validate_generation_config(&self) -> Result<(), ConfigError> {
        let options = &self.generation;

        if !(0.0..=2.0).contains(&options.temperature) {
            return Err(ConfigError::InvalidTemperature(options.temperature));
        }

        if !(0.0..=1.0).contains(&options.top_p) {
            return Err(ConfigError::InvalidTopP(options.top_p));
        }

        if options.num_ctx == 0 {
            return Err(ConfigError::InvalidContextSize(options.num_ctx));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(10..=100_000).contains(&config.window_size) {
            return Err(ConfigError::InvalidWindowSize(config.window_size));
        }

        if config.overlap >= config.window_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.window_size,
            ));
        }

        Ok(())
    }

    fn validate_rag_config(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if !(-1.0..=1.0).contains(&rag.similarity_threshold) {
            return Err(ConfigError::InvalidSimilarityThreshold(
                rag.similarity_threshold,
            ));
        }

        for limit in [rag.context_limit, rag.search_limit] {
            if !(1..=100).contains(&limit) {
                return Err(ConfigError::InvalidResultLimit(limit));
            }
        }

        Ok(())
    }

    fn validate_service_config(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        if self.conversations.capacity == 0 {
            return Err(ConfigError::InvalidConversationCapacity(
                self.conversations.capacity,
            ));
        }

        if self.conversations.max_messages < 2 {
            return Err(ConfigError::InvalidMaxMessages(
                self.conversations.max_messages,
            ));
        }

        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
