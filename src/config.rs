use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// `"huggingface"` or `"file"`.
    pub provider: String,
    /// Dataset id for the huggingface provider (e.g. `"arbml/adawat"`).
    #[serde(default)]
    pub dataset: Option<String>,
    /// Dataset config name for the huggingface provider.
    #[serde(default = "default_subset")]
    pub subset: String,
    #[serde(default = "default_split")]
    pub split: String,
    /// Path to a JSON array of records for the file provider.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Override the datasets-server base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_subset() -> String {
    "default".to_string()
}
fn default_split() -> String {
    "train".to_string()
}
fn default_page_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"huggingface"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override the inference API base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate source
    match config.source.provider.as_str() {
        "huggingface" => {
            if config.source.dataset.is_none() {
                anyhow::bail!("source.dataset must be set when provider is 'huggingface'");
            }
        }
        "file" => {
            if config.source.path.is_none() {
                anyhow::bail!("source.path must be set when provider is 'file'");
            }
        }
        other => anyhow::bail!(
            "Unknown source provider: '{}'. Must be huggingface or file.",
            other
        ),
    }

    if config.source.page_size == 0 {
        anyhow::bail!("source.page_size must be > 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "huggingface" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or huggingface.",
            other
        ),
    }

    Ok(config)
}
