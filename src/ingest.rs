//! Document ingestion: bytes, URLs, and raw text in; a [`Source`] out.
//!
//! | Input | Extraction |
//! |-------|------------|
//! | PDF file | text layer, page by page ([`crate::extract`]) |
//! | Image file | vision model with the OCR prompt |
//! | URL | fetched and boilerplate-stripped ([`crate::fetch`]) |
//! | Text | used as-is |
//!
//! Ingestion never touches a session. Errors are `UnsupportedFormat`,
//! `Fetch`, or `Extraction`; callers only mutate a session once a
//! [`Source`] has been produced.

use std::sync::Arc;

use chrono::Utc;
use docqa_core::models::{Source, SourceKind};
use docqa_core::prompt::OCR_PROMPT;
use sha2::{Digest, Sha256};

use crate::config::IngestConfig;
use crate::error::{RagError, RagResult};
use crate::extract::{self, FileKind};
use crate::fetch::Fetcher;
use crate::generation::{GenerationRequest, Generator, InlineImage};

/// Name given to sources created from pasted text.
pub const CUSTOM_TEXT_NAME: &str = "Custom text";

/// Raw input to ingest.
#[derive(Debug, Clone)]
pub enum SourceInput {
    File { bytes: Vec<u8>, name: String },
    Url(String),
    Text(String),
}

impl SourceInput {
    /// Build an input from the CLI's `<pdf|image|url|text> <value>` pair,
    /// reading files from disk.
    pub fn from_cli(kind: &str, value: &str) -> anyhow::Result<Self> {
        match kind {
            "pdf" | "image" => {
                let bytes = std::fs::read(value)
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", value, e))?;
                let name = std::path::Path::new(value)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(value)
                    .to_string();
                Ok(SourceInput::File { bytes, name })
            }
            "url" => Ok(SourceInput::Url(value.to_string())),
            "text" => Ok(SourceInput::Text(value.to_string())),
            other => anyhow::bail!(
                "Unknown source type '{}'. Must be pdf, image, url, or text.",
                other
            ),
        }
    }
}

pub struct Ingestor {
    fetcher: Fetcher,
    vision: Arc<dyn Generator>,
}

impl Ingestor {
    pub fn new(config: &IngestConfig, vision: Arc<dyn Generator>) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
            vision,
        })
    }

    pub async fn ingest(&self, input: SourceInput) -> RagResult<Source> {
        let source = match input {
            SourceInput::File { bytes, name } => self.ingest_file(bytes, name).await?,
            SourceInput::Url(url) => {
                let url = url.trim().to_string();
                let doc = self.fetcher.fetch(&url).await?;
                new_source(SourceKind::Url, url, doc.text, doc.pages)
            }
            SourceInput::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(RagError::Extraction("no extractable text".to_string()));
                }
                new_source(SourceKind::Text, CUSTOM_TEXT_NAME.to_string(), text.to_string(), 1)
            }
        };

        tracing::info!(
            kind = %source.kind,
            name = %source.name,
            chars = source.char_count(),
            pages = source.page_count,
            "extracted source"
        );
        Ok(source)
    }

    async fn ingest_file(&self, bytes: Vec<u8>, name: String) -> RagResult<Source> {
        let kind = extract::detect(&name)?;
        if bytes.is_empty() {
            return Err(RagError::Extraction(format!("'{}' is empty", name)));
        }

        match kind {
            FileKind::Pdf => {
                let pdf = tokio::task::spawn_blocking(move || extract::extract_pdf(&bytes))
                    .await
                    .map_err(|e| {
                        RagError::Extraction(format!("PDF extraction task failed: {}", e))
                    })??;
                Ok(new_source(SourceKind::Pdf, name, pdf.text, pdf.pages))
            }
            FileKind::Image { mime_type } => {
                let request = GenerationRequest::text(OCR_PROMPT).with_image(InlineImage {
                    mime_type: mime_type.to_string(),
                    data: bytes,
                });
                let text = self.vision.generate(request).await.map_err(|e| {
                    RagError::Extraction(format!("image text extraction failed: {}", e))
                })?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(RagError::Extraction(format!(
                        "no readable text found in '{}'",
                        name
                    )));
                }
                Ok(new_source(SourceKind::Image, name, text.to_string(), 1))
            }
        }
    }
}

fn new_source(kind: SourceKind, name: String, text: String, page_count: usize) -> Source {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    Source {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        name,
        text,
        page_count,
        content_hash,
        created_at: Utc::now(),
    }
}

/// Human-readable label, e.g. `PDF: report.pdf`.
pub fn describe(source: &Source) -> String {
    match source.kind {
        SourceKind::Pdf => format!("PDF: {}", source.name),
        SourceKind::Image => format!("Image: {}", source.name),
        SourceKind::Url => format!("URL: {}", source.name),
        SourceKind::Text => "Text content".to_string(),
    }
}
