//! Web page fetching and main-text extraction.
//!
//! Pages are downloaded with a bounded timeout and body size. HTML is
//! reduced to readable text: script, style, and page chrome (navigation,
//! header, footer, sidebars, forms) are dropped, and `<main>` or
//! `<article>` is preferred over the whole `<body>`. Plain-text bodies are
//! used as-is and PDF links go through [`crate::extract::extract_pdf`].

use scraper::{ElementRef, Html, Selector};

use crate::config::IngestConfig;
use crate::error::{RagError, RagResult};
use crate::extract;

/// Elements whose content never counts as page text.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside",
    "form", "iframe",
];

/// Elements that end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "tr", "table", "blockquote", "pre", "br", "hr", "dd", "dt", "figcaption",
];

/// Text obtained from a URL.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub text: String,
    /// Pages for PDF links, 1 otherwise.
    pub pages: usize,
}

pub struct Fetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(config: &IngestConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.url_timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_url_bytes,
        })
    }

    /// Download `url` and return its readable text.
    pub async fn fetch(&self, url: &str) -> RagResult<FetchedDocument> {
        let fetch_err = |reason: String| RagError::Fetch {
            url: url.to_string(),
            reason,
        };

        let parsed =
            reqwest::Url::parse(url).map_err(|e| fetch_err(format!("invalid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(fetch_err(format!(
                "unsupported scheme '{}', only http and https are allowed",
                parsed.scheme()
            )));
        }

        tracing::debug!(%url, "fetching page");
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| fetch_err(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status)));
        }

        if let Some(len) = response.content_length() {
            if usize::try_from(len).map_or(true, |l| l > self.max_bytes) {
                return Err(fetch_err(format!(
                    "response of {} bytes exceeds the {} byte limit",
                    len, self.max_bytes
                )));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_err(e.without_url().to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(fetch_err(format!(
                    "response exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        // PDF parsing is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || document_from_body(&content_type, &body))
            .await
            .map_err(|e| RagError::Extraction(format!("page extraction task failed: {}", e)))?
    }
}

/// Turn a downloaded body into text according to its content type.
pub fn document_from_body(content_type: &str, body: &[u8]) -> RagResult<FetchedDocument> {
    if content_type == extract::MIME_PDF {
        let pdf = extract::extract_pdf(body)?;
        return Ok(FetchedDocument {
            text: pdf.text,
            pages: pdf.pages,
        });
    }

    let raw = String::from_utf8_lossy(body);
    let text = match content_type {
        "" | "text/html" | "application/xhtml+xml" => extract_main_text(&raw),
        ct if ct.starts_with("text/") => raw.trim().to_string(),
        other => {
            return Err(RagError::UnsupportedFormat(format!(
                "URL returned content type {}",
                other
            )))
        }
    };

    if text.is_empty() {
        return Err(RagError::Extraction(
            "page contains no extractable text".to_string(),
        ));
    }
    Ok(FetchedDocument { text, pages: 1 })
}

/// Readable text of an HTML document, one block per line.
pub fn extract_main_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let root = ["main", "article", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    walk(root, &mut out);

    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            // Source line breaks are not text structure; blocks are.
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            continue;
        }
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = el.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        }
        let block = BLOCK_ELEMENTS.contains(&name) || name == "body";
        if block {
            out.push('\n');
        }
        walk(el, out);
        if block {
            out.push('\n');
        }
    }
}
