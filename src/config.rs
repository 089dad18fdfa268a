use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub graph: GraphConfig,
    pub embeddings: EmbeddingsConfig,
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Knowledge graph configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Path to the graph description JSON (nodes + edges).
    pub data_path: PathBuf,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub api_key_env: String,
    pub dimensions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Retriever configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverConfig {
    /// Directory holding the persistent vector index.
    pub index_path: PathBuf,
    /// Collection name inside the index.
    pub collection: String,
    #[serde(default = "default_k")]
    pub default_k: usize,
}

/// LLM client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_api_key_env(),
            model: default_llm_model(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_k() -> usize {
    3
}

fn default_llm_api_key_env() -> String {
    crate::llm::API_KEY_ENV.to_string()
}

fn default_llm_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading
    /// config. Looks for the config file in this order:
    /// 1. Path specified in TRAFFICRAG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("TRAFFICRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !self.graph.data_path.is_file() {
            anyhow::bail!(
                "graph.data_path does not exist: {}. Point it at your graph description JSON.",
                self.graph.data_path.display()
            );
        }

        if !self.retriever.index_path.is_dir() {
            anyhow::bail!(
                "retriever.index_path is not a directory: {}",
                self.retriever.index_path.display()
            );
        }

        // Credentials must be present up front; it is cheaper to crash at
        // startup than to fail later mid-request.
        for key_env in [&self.embeddings.api_key_env, &self.llm.api_key_env] {
            std::env::var(key_env).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or environment.",
                    key_env
                )
            })?;
        }

        if self.retriever.default_k == 0 {
            anyhow::bail!("retriever.default_k must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        Ok(())
    }

    /// Get the graph description path
    pub fn data_path(&self) -> &Path {
        &self.graph.data_path
    }

    /// Get the vector index directory
    pub fn index_path(&self) -> &Path {
        &self.retriever.index_path
    }

    /// Resolve the embeddings API credential from the environment.
    pub fn embeddings_api_key(&self) -> Result<String> {
        std::env::var(&self.embeddings.api_key_env)
            .with_context(|| format!("Environment variable {} not set", self.embeddings.api_key_env))
    }

    /// Resolve the LLM API credential from the environment.
    pub fn llm_api_key(&self) -> Result<String> {
        std::env::var(&self.llm.api_key_env)
            .with_context(|| format!("Environment variable {} not set", self.llm.api_key_env))
    }
}
