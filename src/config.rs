//! TOML configuration parsing and validation.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) gives a working Gemini-backed setup. The single secret, the API key
//! for the hosted model, is never part of the file: the config only names
//! the environment variable it is read from (see [`CredentialsConfig`]).

use anyhow::{bail, Context, Result};
use docqa_core::chunk::{ChunkParams, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use docqa_core::prompt::NotFoundDetection;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docqa.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted request body (multipart uploads included).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

/// Chunk size and overlap, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the document prompt.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `gemini`, `openai`, `ollama`, or `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama host, API proxy).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `gemini` or `openai`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Model used for image text extraction.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            vision_model: default_vision_model(),
            temperature: default_temperature(),
            max_retries: 0,
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_vision_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    /// `gemini`, `google`, `duckduckgo`, or `disabled`.
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Gemini model used with the `google_search` grounding tool.
    #[serde(default = "default_search_model")]
    pub model: String,
    /// Programmable Search Engine id (`google` provider).
    #[serde(default)]
    pub engine_id: Option<String>,
    /// Env var holding a separate key for the `google` provider; falls back
    /// to the main credential when unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override for the `gemini` provider (API proxy).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            max_results: default_max_results(),
            model: default_search_model(),
            engine_id: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_search_provider() -> String {
    "gemini".to_string()
}
fn default_max_results() -> usize {
    5
}
fn default_search_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnswerConfig {
    #[serde(default)]
    pub not_found_detection: NotFoundDetection,
    /// Ask the model for `{"answer", "found_in_context"}` JSON.
    #[serde(default)]
    pub structured_output: bool,
    /// Answer from general model knowledge when web search fails instead
    /// of failing the turn.
    #[serde(default)]
    pub model_knowledge_on_search_error: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_timeout_secs")]
    pub url_timeout_secs: u64,
    #[serde(default = "default_max_url_bytes")]
    pub max_url_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            url_timeout_secs: default_timeout_secs(),
            max_url_bytes: default_max_url_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_url_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_user_agent() -> String {
    format!("docqa/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    /// Environment variable holding the hosted model API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl CredentialsConfig {
    /// Read the API key from the environment.
    pub fn resolve(&self) -> Result<ApiKey> {
        read_key(&self.api_key_env)
    }
}

/// Read a non-empty secret from the named environment variable.
pub fn read_key(var: &str) -> Result<ApiKey> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(ApiKey(value.trim().to_string())),
        _ => bail!("{} environment variable not set", var),
    }
}

/// API credential. Never printed: `Debug` and `Display` are redacted.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for building request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if given, else [`DEFAULT_CONFIG_PATH`] if it exists, else
/// built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    if let Some(p) = path {
        return load_config(p);
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
    if fallback.exists() {
        return load_config(&fallback);
    }
    let config = Config::default();
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    config.chunking.params().validate()?;

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.server.max_upload_bytes == 0 {
        bail!("server.max_upload_bytes must be > 0");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "gemini" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be gemini, openai, ollama, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "gemini" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini or openai.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    match config.web_search.provider.as_str() {
        "gemini" | "duckduckgo" | "disabled" => {}
        "google" => {
            if config.web_search.engine_id.is_none() {
                bail!("web_search.engine_id must be set when provider is 'google'");
            }
        }
        other => bail!(
            "Unknown web search provider: '{}'. Must be gemini, google, duckduckgo, or disabled.",
            other
        ),
    }

    if config.web_search.max_results == 0 {
        bail!("web_search.max_results must be > 0");
    }

    Ok(())
}
