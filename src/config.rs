use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AssistantConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Assistant store: conversation log, mirrored catalog, audit tables.
    pub assistant_db_path: String,
    /// Authoritative transactional store (customers, orders, products).
    pub store_db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of prior messages pulled into the grounding prompt.
    pub context_k: usize,
    pub recommendation_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_assistant_dir();
        Self {
            assistant_db_path: dir.join("assistant.db").to_string_lossy().into_owned(),
            store_db_path: dir.join("store.db").to_string_lossy().into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".into(),
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 60,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            context_k: 5,
            recommendation_limit: 5,
        }
    }
}

/// Returns `~/.pos-assistant/`, or `./.pos-assistant/` when no home directory is known.
pub fn default_assistant_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pos-assistant")
}

/// Returns the default config file path: `~/.pos-assistant/config.toml`
pub fn default_config_path() -> PathBuf {
    default_assistant_dir().join("config.toml")
}

impl AssistantConfig {
    /// Load config from `POS_ASSISTANT_CONFIG` or the default path, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("POS_ASSISTANT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(path)
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AssistantConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (POS_ASSISTANT_DB, POS_ASSISTANT_STORE_DB, POS_ASSISTANT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("POS_ASSISTANT_DB") {
            self.storage.assistant_db_path = val;
        }
        if let Ok(val) = std::env::var("POS_ASSISTANT_STORE_DB") {
            self.storage.store_db_path = val;
        }
        if let Ok(val) = std::env::var("POS_ASSISTANT_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    pub fn resolved_assistant_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.assistant_db_path)
    }

    pub fn resolved_store_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.store_db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
