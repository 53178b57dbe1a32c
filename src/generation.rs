//! Text generation backends.
//!
//! A [`Generator`] turns a prompt (optionally with one inline image) into
//! text. It is used for answers, summaries, and image text extraction.
//!
//! | Config Value | Provider | Credential |
//! |-------------|----------|------------|
//! | `"gemini"` | [`GeminiGenerator`] | env var named by `credentials.api_key_env` |
//! | `"openai"` | [`OpenAIGenerator`] | `OPENAI_API_KEY` |
//!
//! Both providers retry 429/5xx/network failures `generation.max_retries`
//! times (see [`crate::http`]) and report exhausted attempts as
//! [`RagError::Generation`].

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::config::{ApiKey, Config, GenerationConfig};
use crate::error::{RagError, RagResult};
use crate::http;

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub(crate) const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// An image passed inline with a prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
    /// Ask for JSON matching this schema. Ignored by backends that return
    /// `false` from [`Generator::supports_structured_output`].
    pub response_schema: Option<Value>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Whether `response_schema` is honored.
    fn supports_structured_output(&self) -> bool {
        false
    }

    async fn generate(&self, request: GenerationRequest) -> RagResult<String>;
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &Config) -> anyhow::Result<Box<dyn Generator>> {
    match config.generation.provider.as_str() {
        "gemini" => {
            let key = config.credentials.resolve()?;
            Ok(Box::new(GeminiGenerator::new(&config.generation, key)?))
        }
        "openai" => {
            let key = crate::config::read_key("OPENAI_API_KEY")?;
            Ok(Box::new(OpenAIGenerator::new(&config.generation, key)?))
        }
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

// ============ Gemini ============

/// `generateContent` endpoint for a model. Accepts `gemini-x` or `models/gemini-x`.
pub(crate) fn gemini_endpoint(base_url: &str, model: &str, method: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!("{}/models/{}:{}", base_url.trim_end_matches('/'), model, method)
}

/// Concatenated text parts of the first candidate.
pub(crate) fn gemini_text(body: &Value) -> Result<String, String> {
    if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
        return Err(format!("prompt blocked: {}", reason));
    }

    let candidate = body["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| "missing 'candidates' in response".to_string())?;

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate["finishReason"].as_str().unwrap_or("unknown");
        return Err(format!("empty response (finish reason: {})", reason));
    }
    Ok(text)
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    vision_model: String,
    temperature: f32,
    max_retries: u32,
    api_key: ApiKey,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: ApiKey) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            api_key,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = &request.image {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(&image.data),
                }
            }));
        }

        let mut generation_config = json!({ "temperature": self.temperature });
        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema.clone();
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest) -> RagResult<String> {
        let model = if request.image.is_some() {
            &self.vision_model
        } else {
            &self.model
        };
        let url = gemini_endpoint(&self.base_url, model, "generateContent");
        let body = self.request_body(&request);

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
        .map_err(|e| RagError::Generation(e.describe("Gemini")))?;

        gemini_text(&json).map_err(|e| RagError::Generation(format!("Gemini {}", e)))
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    vision_model: String,
    temperature: f32,
    max_retries: u32,
    api_key: ApiKey,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, api_key: ApiKey) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            api_key,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let (model, content) = match &request.image {
            Some(image) => {
                let data_url = format!(
                    "data:{};base64,{}",
                    image.mime_type,
                    base64::engine::general_purpose::STANDARD.encode(&image.data)
                );
                (
                    &self.vision_model,
                    json!([
                        { "type": "text", "text": request.prompt },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ]),
                )
            }
            None => (&self.model, json!(request.prompt)),
        };

        let mut body = json!({
            "model": model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": content }],
        });
        if let Some(schema) = &request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": "answer", "schema": schema },
            });
        }
        body
    }
}

fn openai_text(body: &Value) -> Result<String, String> {
    let text = body["choices"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| c["message"]["content"].as_str())
        .ok_or_else(|| "missing 'choices[0].message.content' in response".to_string())?;
    if text.trim().is_empty() {
        return Err("empty response".to_string());
    }
    Ok(text.to_string())
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest) -> RagResult<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.request_body(&request);

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
        .map_err(|e| RagError::Generation(e.describe("OpenAI")))?;

        openai_text(&json).map_err(|e| RagError::Generation(format!("OpenAI {}", e)))
    }
}
