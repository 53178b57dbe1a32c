//! In-process fakes for the embedding, generation, and search services.

#![allow(dead_code)]

use async_trait::async_trait;
use docqa::assistant::{Assistant, Services};
use docqa::config::Config;
use docqa::embedding::{EmbedTask, Embedder};
use docqa::error::{RagError, RagResult};
use docqa::generation::{GenerationRequest, Generator};
use docqa::session::InMemorySessionStore;
use docqa::web_search::WebSearcher;
use docqa_core::models::WebSnippet;
use docqa_core::prompt::NOT_FOUND_SENTINEL;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const DIMS: usize = 64;

// ─── Embedder ───────────────────────────────────────────────────────

/// Bag-of-words hashing embedder: identical texts get identical vectors
/// and texts sharing words get positive similarity.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
    pub fail: AtomicBool,
}

pub fn embed_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    // Keep empty inputs distinguishable from nothing.
    v[0] += 0.01;
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String], _task: EmbedTask) -> RagResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingService("HTTP 503 from fake".into()));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| embed_words(t)).collect())
    }
}

// ─── Generator ──────────────────────────────────────────────────────

pub const WEB_ANSWER: &str = "Paris is the capital of France.";
pub const GENERAL_ANSWER: &str = "From general knowledge: Paris.";
pub const SUMMARY: &str = "A short summary.";
pub const OCR_TEXT: &str = "Invoice number 42. Total due: 10 dollars.";

/// Answers by prompt shape. Document prompts are answered from the
/// context when it mentions Rayleigh or invoices, otherwise with the
/// not-found sentinel.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub fail_answers: AtomicBool,
    /// Replace the document-path reply.
    pub document_reply: Mutex<Option<String>>,
    pub structured: bool,
    /// Park document answers: signal `entered`, then wait for `release`.
    pub hold_answers: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl ScriptedGenerator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn supports_structured_output(&self) -> bool {
        self.structured
    }

    async fn generate(&self, request: GenerationRequest) -> RagResult<String> {
        let prompt = request.prompt.clone();
        self.prompts.lock().unwrap().push(prompt.clone());

        if request.image.is_some() {
            return Ok(OCR_TEXT.to_string());
        }
        if prompt.starts_with("Provide a brief") {
            return Ok(SUMMARY.to_string());
        }
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(RagError::Generation("HTTP 500 from fake".into()));
        }
        if prompt.starts_with("Use the following pieces of context") {
            if self.hold_answers.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if let Some(reply) = self.document_reply.lock().unwrap().clone() {
                return Ok(reply);
            }
            let context = prompt.split("Question:").next().unwrap_or("");
            if context.contains("Rayleigh") {
                return Ok("The sky is blue because of Rayleigh scattering.".to_string());
            }
            if context.contains("Invoice") {
                return Ok("The total due is 10 dollars.".to_string());
            }
            return Ok(NOT_FOUND_SENTINEL.to_string());
        }
        if prompt.contains("Search results:") {
            return Ok(WEB_ANSWER.to_string());
        }
        if prompt.contains("general knowledge") {
            return Ok(GENERAL_ANSWER.to_string());
        }
        Ok("Unrecognized prompt.".to_string())
    }
}

// ─── Web search ─────────────────────────────────────────────────────

pub struct StaticSearcher {
    pub results: Vec<WebSnippet>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl StaticSearcher {
    pub fn paris() -> Self {
        Self {
            results: vec![WebSnippet {
                title: "Paris - Wikipedia".into(),
                url: "https://en.wikipedia.org/wiki/Paris".into(),
                snippet: "Paris is the capital and largest city of France.".into(),
            }],
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearcher for StaticSearcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str) -> RagResult<Vec<WebSnippet>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::SearchService("HTTP 429 from fake".into()));
        }
        Ok(self.results.clone())
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

pub struct Harness {
    pub assistant: Arc<Assistant>,
    pub embedder: Arc<HashEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    pub searcher: Arc<StaticSearcher>,
}

pub fn harness_with(
    config: &Config,
    generator: ScriptedGenerator,
    searcher: StaticSearcher,
) -> Harness {
    let embedder = Arc::new(HashEmbedder::default());
    let generator = Arc::new(generator);
    let searcher = Arc::new(searcher);
    let services = Services {
        embedder: embedder.clone(),
        generator: generator.clone(),
        searcher: searcher.clone(),
        store: Arc::new(InMemorySessionStore::new()),
    };
    let assistant = Arc::new(Assistant::new(config, services).unwrap());
    Harness {
        assistant,
        embedder,
        generator,
        searcher,
    }
}

pub fn harness() -> Harness {
    harness_with(
        &Config::default(),
        ScriptedGenerator::default(),
        StaticSearcher::paris(),
    )
}

/// A single-page PDF whose text layer is `phrase`.
pub fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    pdf_with_pages(&[phrase])
}

/// A PDF with one page per entry of `pages`, each holding that text.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >>",
            5 + 2 * i
        ));
        objects.push(format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for off in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    pdf
}
