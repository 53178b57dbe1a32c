//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`GeminiEmbedder`]**: Gemini `batchEmbedContents` (default, `models/gemini-embedding-001`).
//! - **[`OpenAIEmbedder`]**: OpenAI embeddings API.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: fastembed in-process models (feature `local-embeddings`).
//!
//! # Provider Selection
//!
//! | Config Value | Provider | Credential |
//! |-------------|----------|------------|
//! | `"gemini"` | [`GeminiEmbedder`] | env var named by `credentials.api_key_env` |
//! | `"openai"` | [`OpenAIEmbedder`] | `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaEmbedder`] | none |
//! | `"local"` | `LocalEmbedder` | none |
//!
//! # Retry Strategy
//!
//! HTTP providers share the loop in [`crate::http`]: 429, 5xx, and network
//! errors are retried `embedding.max_retries` times with exponential backoff;
//! other 4xx fail immediately. Exhausted attempts surface as
//! [`RagError::EmbeddingService`].

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{ApiKey, Config, EmbeddingConfig};
use crate::error::{RagError, RagResult};
use crate::generation::{gemini_endpoint, GEMINI_BASE_URL, OPENAI_BASE_URL};
use crate::http;

const DEFAULT_GEMINI_MODEL: &str = "models/gemini-embedding-001";
const DEFAULT_GEMINI_DIMS: usize = 3072;
/// Gemini rejects batch requests with more than this many entries.
const GEMINI_MAX_BATCH: usize = 100;

/// What a text is embedded for. Some models use different projections for
/// stored passages and search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"models/gemini-embedding-001"`).
    fn model_name(&self) -> &str;
    /// Returns the expected vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String], task: EmbedTask) -> RagResult<Vec<Vec<f32>>>;
}

/// Embed one query string.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> RagResult<Vec<f32>> {
    embedder
        .embed(&[text.to_string()], EmbedTask::Query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::EmbeddingService("empty embedding response".to_string()))
}

/// Read `f32` vectors from a JSON array of numbers.
fn json_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

// ============ Gemini Provider ============

pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    /// Sent as `outputDimensionality` only when configured.
    output_dims: Option<usize>,
    max_retries: u32,
    api_key: ApiKey,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: ApiKey) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let model = if model.starts_with("models/") {
            model
        } else {
            format!("models/{}", model)
        };

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model,
            dims: config.dims.unwrap_or(DEFAULT_GEMINI_DIMS),
            output_dims: config.dims,
            max_retries: config.max_retries,
            api_key,
        })
    }

    fn request_body(&self, texts: &[String], task: EmbedTask) -> Value {
        let task_type = match task {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        };
        let requests: Vec<Value> = texts
            .iter()
            .map(|t| {
                let mut r = json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": t }] },
                    "taskType": task_type,
                });
                if let Some(d) = self.output_dims {
                    r["outputDimensionality"] = json!(d);
                }
                r
            })
            .collect();
        json!({ "requests": requests })
    }
}

fn parse_gemini_response(json: &Value) -> Result<Vec<Vec<f32>>, String> {
    let embeddings = json["embeddings"]
        .as_array()
        .ok_or_else(|| "missing embeddings array".to_string())?;
    embeddings
        .iter()
        .map(|e| json_vector(&e["values"]).ok_or_else(|| "missing embedding values".to_string()))
        .collect()
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], task: EmbedTask) -> RagResult<Vec<Vec<f32>>> {
        let url = gemini_endpoint(&self.base_url, &self.model, "batchEmbedContents");
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(GEMINI_MAX_BATCH) {
            let body = self.request_body(batch, task);
            let json = http::send_json_with_retry(
                || {
                    self.client
                        .post(&url)
                        .header("x-goog-api-key", self.api_key.expose())
                        .json(&body)
                },
                self.max_retries,
            )
            .await
            .map_err(|e| RagError::EmbeddingService(e.describe("Gemini embeddings")))?;

            let vectors = parse_gemini_response(&json).map_err(|e| {
                RagError::EmbeddingService(format!("invalid Gemini response: {}", e))
            })?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`), or any
/// compatible endpoint set through `embedding.url`.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
    api_key: ApiKey,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: ApiKey) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dims: config.dims.unwrap_or(1536),
            max_retries: config.max_retries,
            api_key,
        })
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, String> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| "missing data array".to_string())?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
        let vec = json_vector(&item["embedding"]).ok_or_else(|| "missing embedding".to_string())?;
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], _task: EmbedTask) -> RagResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "input": texts });
        let json = http::send_json_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key.expose()))
                    .json(&body)
            },
            self.max_retries,
        )
        .await
        .map_err(|e| RagError::EmbeddingService(e.describe("OpenAI embeddings")))?;

        parse_openai_response(&json)
            .map_err(|e| RagError::EmbeddingService(format!("invalid OpenAI response: {}", e)))
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            dims: config.dims.unwrap_or(768),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
        })
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, String> {
    let embeddings = json["embeddings"]
        .as_array()
        .ok_or_else(|| "missing embeddings array".to_string())?;
    embeddings
        .iter()
        .map(|e| json_vector(e).ok_or_else(|| "embedding is not an array".to_string()))
        .collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], _task: EmbedTask) -> RagResult<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "input": texts });
        let json = http::send_json_with_retry(
            || self.client.post(&endpoint).json(&body),
            self.max_retries,
        )
        .await
        .map_err(|e| {
            RagError::EmbeddingService(format!(
                "{} (is Ollama running at {}?)",
                e.describe("Ollama"),
                self.url
            ))
        })?;

        parse_ollama_response(&json)
            .map_err(|e| RagError::EmbeddingService(format!("invalid Ollama response: {}", e)))
    }
}

// ============ Local Provider (fastembed) ============

/// In-process embeddings via fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached; later
/// calls run offline. Initialization happens lazily on the first embed.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Fail at startup on an unknown name rather than on first upload.
        config_to_fastembed_model(&model_name)?;

        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
            "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
            _ => 384,
        });

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Default::default(),
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base, \
             multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], _task: EmbedTask) -> RagResult<Vec<Vec<f32>>> {
        let slot = self.model.clone();
        let name = self.model_name.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| RagError::EmbeddingService("local model lock poisoned".to_string()))?;

            if guard.is_none() {
                let model = config_to_fastembed_model(&name)
                    .map_err(|e| RagError::EmbeddingService(e.to_string()))?;
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    RagError::EmbeddingService(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }

            match guard.as_mut() {
                Some(model) => model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| {
                        RagError::EmbeddingService(format!("local embedding failed: {}", e))
                    }),
                None => Err(RagError::EmbeddingService("local model not loaded".to_string())),
            }
        })
        .await
        .map_err(|e| RagError::EmbeddingService(format!("embedding task failed: {}", e)))?
    }
}

/// Create the configured [`Embedder`].
///
/// # Errors
///
/// Returns an error for unknown provider names, a missing credential, or
/// `"local"` without the `local-embeddings` feature.
pub fn create_embedder(config: &Config) -> anyhow::Result<Box<dyn Embedder>> {
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiEmbedder::new(
            embedding,
            config.credentials.resolve()?,
        )?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(
            embedding,
            crate::config::read_key("OPENAI_API_KEY")?,
        )?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(embedding)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::new(embedding)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => anyhow::bail!("Local embedding provider requires --features local-embeddings"),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_model_prefix_and_body() {
        let config = EmbeddingConfig {
            model: Some("gemini-embedding-001".into()),
            dims: Some(768),
            ..Default::default()
        };
        let e = GeminiEmbedder::new(&config, ApiKey::new("k")).unwrap();
        assert_eq!(e.model_name(), "models/gemini-embedding-001");
        assert_eq!(e.dims(), 768);

        let body = e.request_body(&["a".into(), "b".into()], EmbedTask::Query);
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(requests[1]["content"]["parts"][0]["text"], "b");
        assert_eq!(requests[0]["outputDimensionality"], 768);
    }

    #[test]
    fn test_gemini_defaults() {
        let e = GeminiEmbedder::new(&EmbeddingConfig::default(), ApiKey::new("k")).unwrap();
        assert_eq!(e.model_name(), DEFAULT_GEMINI_MODEL);
        assert_eq!(e.dims(), DEFAULT_GEMINI_DIMS);
        let body = e.request_body(&["a".into()], EmbedTask::Document);
        assert!(body["requests"][0].get("outputDimensionality").is_none());
    }

    #[test]
    fn test_parse_gemini_response() {
        let json = json!({ "embeddings": [{ "values": [0.5, 1.0] }, { "values": [0.0, -1.0] }] });
        let v = parse_gemini_response(&json).unwrap();
        assert_eq!(v, vec![vec![0.5, 1.0], vec![0.0, -1.0]]);
        assert!(parse_gemini_response(&json!({})).is_err());
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = json!({ "data": [
            { "index": 1, "embedding": [2.0] },
            { "index": 0, "embedding": [1.0] },
        ]});
        assert_eq!(parse_openai_response(&json).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "embeddings": [[1.0, 2.0]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![1.0, 2.0]]);
        assert!(parse_ollama_response(&json!({ "embeddings": [1.0] })).is_err());
    }

    #[test]
    fn test_create_embedder_ollama_needs_no_key() {
        let mut config = Config::default();
        config.embedding.provider = "ollama".into();
        let e = create_embedder(&config).unwrap();
        assert_eq!(e.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_create_embedder_unknown() {
        let mut config = Config::default();
        config.embedding.provider = "word2vec".into();
        assert!(create_embedder(&config).is_err());
    }

    #[tokio::test]
    async fn test_openai_embedder_honours_url_override() {
        let base = http::stub::serve_json(
            "/proxy/v1/embeddings",
            json!({ "data": [{ "index": 0, "embedding": [0.25, 0.75] }] }),
        )
        .await;
        let config = EmbeddingConfig {
            provider: "openai".into(),
            url: Some(format!("{}/proxy/v1/", base)),
            ..Default::default()
        };
        let e = OpenAIEmbedder::new(&config, ApiKey::new("k")).unwrap();
        let v = e.embed(&["hello".into()], EmbedTask::Document).await.unwrap();
        assert_eq!(v, vec![vec![0.25, 0.75]]);
    }
}
