//! Configuration loading and validation.
//!
//! Configuration is a TOML file, passed with `--config` (default
//! `./config/erp-search.toml`). Only `[db]` is required; every other table
//! falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/erp-search.sqlite"
//!
//! [embedding]
//! provider = "http"          # "disabled" or "http"
//! url = "http://localhost:8000"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [retrieval]
//! keyword_limit = 500
//! semantic_limit = 100
//!
//! [scoring]
//! domain_boost = 1000.0
//!
//! [server]
//! bind = "127.0.0.1:7331"
//! ```
//!
//! The `ERP_SEARCH_EMBEDDING_URL` environment variable overrides
//! `embedding.url`.

use anyhow::{bail, Context, Result};
use erp_search_core::scoring::ScoringWeights;
use erp_search_core::search::SearchParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `embedding.url`.
pub const EMBEDDING_URL_ENV: &str = "ERP_SEARCH_EMBEDDING_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: None,
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    32
}
fn default_timeout_secs() -> u64 {
    10
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,
    #[serde(default = "default_semantic_limit")]
    pub semantic_limit: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_limit: default_keyword_limit(),
            semantic_limit: default_semantic_limit(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_keyword_limit() -> usize {
    500
}
fn default_semantic_limit() -> usize {
    100
}
fn default_page_size() -> usize {
    20
}
fn default_max_page_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

impl Config {
    /// Search tuning derived from `[retrieval]` and `[scoring]`.
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            keyword_limit: self.retrieval.keyword_limit,
            semantic_limit: self.retrieval.semantic_limit,
            default_page_size: self.retrieval.default_page_size,
            max_page_size: self.retrieval.max_page_size,
            weights: self.scoring.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Ok(url) = std::env::var(EMBEDDING_URL_ENV) {
        if !url.trim().is_empty() {
            config.embedding.url = Some(url);
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.keyword_limit == 0 {
        bail!("retrieval.keyword_limit must be >= 1");
    }
    if r.semantic_limit == 0 {
        bail!("retrieval.semantic_limit must be >= 1");
    }
    if r.default_page_size == 0 {
        bail!("retrieval.default_page_size must be >= 1");
    }
    if r.max_page_size < r.default_page_size {
        bail!("retrieval.max_page_size must be >= retrieval.default_page_size");
    }

    let s = &config.scoring;
    if s.keyword_scale <= 0.0 {
        bail!("scoring.keyword_scale must be > 0");
    }
    for w in [s.keyword_weight, s.semantic_weight] {
        if !(0.0..=1.0).contains(&w) {
            bail!("scoring.keyword_weight and scoring.semantic_weight must be in [0.0, 1.0]");
        }
    }

    let e = &config.embedding;
    match e.provider.as_str() {
        "disabled" => {}
        "http" => {
            if e.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                bail!(
                    "embedding.url must be set when provider is 'http' (or set {})",
                    EMBEDDING_URL_ENV
                );
            }
            if e.dims == 0 {
                bail!("embedding.dims must be > 0 when provider is 'http'");
            }
            if e.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}
