//! Live web search used when the documents cannot answer a question.
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"gemini"` | Gemini `generateContent` with the `google_search` grounding tool |
//! | `"google"` | Google Programmable Search JSON API |
//! | `"duckduckgo"` | DuckDuckGo instant answers (no key) |
//! | `"disabled"` | always returns no results |
//!
//! An empty result means nothing was found. Transport and auth failures
//! are [`RagError::SearchService`].

use async_trait::async_trait;
use docqa_core::models::WebSnippet;
use serde_json::{json, Value};

use crate::config::{ApiKey, Config, WebSearchConfig};
use crate::error::{RagError, RagResult};
use crate::generation::{gemini_endpoint, GEMINI_BASE_URL};
use crate::http;

/// Search calls are not retried; a failed search fails fast.
const SEARCH_RETRIES: u32 = 0;

#[async_trait]
pub trait WebSearcher: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> RagResult<Vec<WebSnippet>>;
}

/// Create the configured [`WebSearcher`].
pub fn create_searcher(config: &Config) -> anyhow::Result<Box<dyn WebSearcher>> {
    let ws = &config.web_search;
    match ws.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiGroundedSearch::new(
            ws,
            config.credentials.resolve()?,
        )?)),
        "google" => {
            let key = match &ws.api_key_env {
                Some(var) => crate::config::read_key(var)?,
                None => config.credentials.resolve()?,
            };
            Ok(Box::new(GoogleCustomSearch::new(ws, key)?))
        }
        "duckduckgo" => Ok(Box::new(DuckDuckGoSearch::new(ws)?)),
        "disabled" => Ok(Box::new(DisabledSearch)),
        other => anyhow::bail!("Unknown web search provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledSearch;

#[async_trait]
impl WebSearcher for DisabledSearch {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn search(&self, _query: &str) -> RagResult<Vec<WebSnippet>> {
        Ok(Vec::new())
    }
}

// ============ Gemini grounding ============

pub struct GeminiGroundedSearch {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_results: usize,
    api_key: ApiKey,
}

impl GeminiGroundedSearch {
    pub fn new(config: &WebSearchConfig, api_key: ApiKey) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config.model.clone(),
            max_results: config.max_results,
            api_key,
        })
    }
}

/// Turn grounding metadata into snippets, one per cited web page.
///
/// Each grounding support contributes its segment text to every chunk it
/// cites. Pages cited by no support get the whole grounded answer.
fn parse_grounded_response(body: &Value, max_results: usize) -> Vec<WebSnippet> {
    let candidate = &body["candidates"][0];
    let metadata = &candidate["groundingMetadata"];

    let Some(chunks) = metadata["groundingChunks"].as_array() else {
        return Vec::new();
    };

    let full_text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    let mut segments: Vec<Vec<String>> = vec![Vec::new(); chunks.len()];
    for support in metadata["groundingSupports"].as_array().into_iter().flatten() {
        let Some(text) = support["segment"]["text"].as_str() else {
            continue;
        };
        for idx in support["groundingChunkIndices"].as_array().into_iter().flatten() {
            if let Some(slot) = idx.as_u64().and_then(|i| segments.get_mut(i as usize)) {
                if !slot.iter().any(|s| s == text) {
                    slot.push(text.to_string());
                }
            }
        }
    }

    let mut out = Vec::new();
    for (chunk, segs) in chunks.iter().zip(segments) {
        let web = &chunk["web"];
        let Some(url) = web["uri"].as_str() else {
            continue;
        };
        if out.iter().any(|s: &WebSnippet| s.url == url) {
            continue;
        }
        let snippet = if segs.is_empty() {
            full_text.trim().to_string()
        } else {
            segs.join(" ")
        };
        if snippet.is_empty() {
            continue;
        }
        out.push(WebSnippet {
            title: web["title"].as_str().unwrap_or("").to_string(),
            url: url.to_string(),
            snippet,
        });
    }
    out.truncate(max_results);
    out
}

#[async_trait]
impl WebSearcher for GeminiGroundedSearch {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn search(&self, query: &str) -> RagResult<Vec<WebSnippet>> {
        let url = gemini_endpoint(&self.base_url, &self.model, "generateContent");
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("Search the web and answer: {}", query) }],
            }],
            "tools": [{ "google_search": {} }],
        });

        let json = http::send_json_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", self.api_key.expose())
                    .json(&body)
            },
            SEARCH_RETRIES,
        )
        .await
        .map_err(|e| RagError::SearchService(e.describe("Gemini search")))?;

        Ok(parse_grounded_response(&json, self.max_results))
    }
}

// ============ Google Programmable Search ============

pub struct GoogleCustomSearch {
    client: reqwest::Client,
    engine_id: String,
    max_results: usize,
    api_key: ApiKey,
}

impl GoogleCustomSearch {
    pub fn new(config: &WebSearchConfig, api_key: ApiKey) -> anyhow::Result<Self> {
        let engine_id = config
            .engine_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("web_search.engine_id required for google provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            engine_id,
            max_results: config.max_results,
            api_key,
        })
    }
}

fn parse_google_items(payload: &Value, max_results: usize) -> Vec<WebSnippet> {
    payload["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| {
            let url = item["link"].as_str()?;
            Some(WebSnippet {
                title: item["title"].as_str().unwrap_or("").to_string(),
                url: url.to_string(),
                snippet: item["snippet"].as_str().unwrap_or("").to_string(),
            })
        })
        .take(max_results)
        .collect()
}

#[async_trait]
impl WebSearcher for GoogleCustomSearch {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(&self, query: &str) -> RagResult<Vec<WebSnippet>> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?cx={}&q={}&num={}",
            urlencoding::encode(&self.engine_id),
            urlencoding::encode(query),
            self.max_results.min(10)
        );

        let json = http::send_json_with_retry(
            || {
                self.client
                    .get(&url)
                    .header("x-goog-api-key", self.api_key.expose())
            },
            SEARCH_RETRIES,
        )
        .await
        .map_err(|e| RagError::SearchService(e.describe("Google search")))?;

        Ok(parse_google_items(&json, self.max_results))
    }
}

// ============ DuckDuckGo ============

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(config: &WebSearchConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            max_results: config.max_results,
        })
    }
}

fn parse_duckduckgo(payload: &Value, max_results: usize) -> Vec<WebSnippet> {
    let mut results = Vec::new();

    let abstract_text = payload["AbstractText"].as_str().unwrap_or("");
    let abstract_url = payload["AbstractURL"].as_str().unwrap_or("");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        results.push(WebSnippet {
            title: payload["Heading"]
                .as_str()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| abstract_text.split(" - ").next().unwrap_or(abstract_text))
                .to_string(),
            url: abstract_url.to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(items) = payload["Results"].as_array() {
        collect_topics(items, &mut results);
    }
    if let Some(items) = payload["RelatedTopics"].as_array() {
        collect_topics(items, &mut results);
    }

    results.truncate(max_results);
    results
}

fn collect_topics(items: &[Value], results: &mut Vec<WebSnippet>) {
    for item in items {
        if let Some(topics) = item["Topics"].as_array() {
            collect_topics(topics, results);
            continue;
        }
        let text = item["Text"].as_str().unwrap_or("");
        let url = item["FirstURL"].as_str().unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebSnippet {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

#[async_trait]
impl WebSearcher for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> RagResult<Vec<WebSnippet>> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let json = http::send_json_with_retry(|| self.client.get(&url), SEARCH_RETRIES)
            .await
            .map_err(|e| RagError::SearchService(e.describe("DuckDuckGo")))?;

        Ok(parse_duckduckgo(&json, self.max_results))
    }
}
