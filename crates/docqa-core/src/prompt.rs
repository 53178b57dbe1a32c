//! Prompt templates and the "not found in context" protocol.
//!
//! The document prompt instructs the model to answer with
//! [`NOT_FOUND_SENTINEL`] when the retrieved context does not hold the
//! answer. [`is_not_found`] is the parser side of that contract; the two must
//! change together.
//!
//! Two detection modes exist:
//!
//! | Mode | Matches |
//! |------|---------|
//! | [`NotFoundDetection::Heuristic`] | any phrase in [`NOT_FOUND_PHRASES`] (includes the sentinel) |
//! | [`NotFoundDetection::Sentinel`] | only the sentinel sentence |
//!
//! The heuristic also fires on legitimate answers that merely quote phrases
//! such as "not available"; it is kept as the default so existing behaviour
//! does not change silently.
//!
//! When the generation backend supports JSON output, the model can instead
//! return a [`StructuredAnswer`] whose `found_in_context` flag decides
//! directly; phrase detection is then only a fallback for unparseable
//! replies.

use serde::{Deserialize, Serialize};

use crate::models::{SourceKind, WebSnippet};

/// Sentence the model is told to emit when the context lacks the answer.
pub const NOT_FOUND_SENTINEL: &str =
    "The provided text does not contain information to answer this question.";

/// Phrases treated as "not found" by [`NotFoundDetection::Heuristic`].
pub const NOT_FOUND_PHRASES: &[&str] = &[
    "does not provide",
    "does not give",
    "does not contain",
    "does not mention",
    "not found in",
    "no information",
    "cannot find",
    "doesn't provide",
    "doesn't give",
    "doesn't contain",
    "doesn't mention",
    "cannot be answered",
    "not available",
    "not provided",
    "from the given",
    "given context",
    "given text",
    "provided text",
    "available in the",
    "insufficient information",
];

/// Instruction sent with an image to the vision model.
pub const OCR_PROMPT: &str = "Extract all readable text from this image.";

/// Combined text shorter than this is used as its own summary.
pub const SUMMARY_MIN_CHARS: usize = 100;
/// Characters of combined text included in a summary prompt.
pub const SUMMARY_INPUT_CHARS: usize = 2000;
/// Characters shown in an added-content preview.
pub const PREVIEW_CHARS: usize = 300;

/// How a document-grounded answer is checked for insufficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotFoundDetection {
    #[default]
    Heuristic,
    Sentinel,
}

/// One retrieved chunk as it appears in the document prompt.
#[derive(Debug, Clone)]
pub struct ContextPassage<'a> {
    pub source_name: &'a str,
    pub text: &'a str,
}

/// Typed reply requested when structured output is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub answer: String,
    pub found_in_context: bool,
}

/// Build the document-path prompt.
///
/// Passages are attributed with `[Source: name]` so the model can cite
/// them. With `structured` set, the model is asked for a
/// [`StructuredAnswer`] JSON object instead of free text.
pub fn document_prompt(
    passages: &[ContextPassage<'_>],
    question: &str,
    structured: bool,
) -> String {
    let context = passages
        .iter()
        .map(|p| format!("[Source: {}]\n{}", p.source_name, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!(
        "Use the following pieces of context to answer the question at the end.\n\
         If you don't know the answer or if the information is not in the context, say \"{}\"\n\n\
         Context: {}\n\n\
         Question: {}\n\n",
        NOT_FOUND_SENTINEL, context, question
    );

    if structured {
        prompt.push_str(
            "Respond with a JSON object with two fields: \"answer\" (string) and \
             \"found_in_context\" (boolean, false when the context does not contain \
             the answer).",
        );
    } else {
        prompt.push_str("Answer:");
    }
    prompt
}

/// Build the web-path prompt from numbered search snippets.
pub fn web_prompt(snippets: &[WebSnippet], question: &str) -> String {
    let results = snippets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if s.title.is_empty() {
                format!("[{}] {}\n{}", i + 1, s.url, s.snippet)
            } else {
                format!("[{}] {} ({})\n{}", i + 1, s.title, s.url, s.snippet)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the question using the following web search results. \
         Refer to results by their number when you use them.\n\n\
         Search results:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        results, question
    )
}

/// Build the prompt used when neither documents nor web results are available.
pub fn general_prompt(question: &str) -> String {
    format!(
        "Answer the following question from your general knowledge. \
         Say so if you are not sure.\n\n\
         Question: {}\n\n\
         Answer:",
        question
    )
}

/// JSON schema for [`StructuredAnswer`], in the OpenAPI subset that
/// hosted generation APIs accept.
pub fn structured_answer_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "answer": { "type": "string" },
            "found_in_context": { "type": "boolean" }
        },
        "required": ["answer", "found_in_context"]
    })
}

/// Parse a structured reply, tolerating a surrounding Markdown code fence.
pub fn parse_structured_answer(raw: &str) -> Option<StructuredAnswer> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).ok()
}

/// Whether a free-text document answer signals missing context.
pub fn is_not_found(answer: &str, detection: NotFoundDetection) -> bool {
    let normalized = normalize(answer);
    match detection {
        NotFoundDetection::Heuristic => NOT_FOUND_PHRASES.iter().any(|p| normalized.contains(p)),
        NotFoundDetection::Sentinel => {
            let sentinel = normalize(NOT_FOUND_SENTINEL);
            normalized.contains(sentinel.trim_end_matches('.'))
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// What a summary describes; picks the summary instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryScope {
    Single(SourceKind),
    /// Several sources combined in one session.
    Mixed,
}

/// Build a summary prompt, or `None` when the text is short enough to be
/// its own summary (see [`local_summary`]).
pub fn summary_prompt(scope: SummaryScope, combined_text: &str) -> Option<String> {
    let trimmed = combined_text.trim();
    if trimmed.chars().count() < SUMMARY_MIN_CHARS {
        return None;
    }

    let instruction = match scope {
        SummaryScope::Single(SourceKind::Image) => {
            "Provide a brief 2-3 sentence summary of the text extracted from this image:"
        }
        SummaryScope::Single(SourceKind::Pdf) => {
            "Provide a brief 2-3 sentence summary of this PDF document:"
        }
        SummaryScope::Single(SourceKind::Url) => {
            "Provide a brief 2-3 sentence summary of this webpage content:"
        }
        SummaryScope::Single(SourceKind::Text) => {
            "Provide a brief 2-3 sentence summary of this text:"
        }
        SummaryScope::Mixed => {
            "Provide a brief 2-3 sentence summary of this combined content from multiple sources:"
        }
    };

    let excerpt: String = trimmed.chars().take(SUMMARY_INPUT_CHARS).collect();
    Some(format!("{}\n\n{}...", instruction, excerpt))
}

/// Summary used when no model call is needed.
pub fn local_summary(combined_text: &str) -> String {
    combined_text.trim().to_string()
}

/// Short description of newly added content.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub source: String,
    pub text_preview: String,
    pub character_count: usize,
    pub document_count: usize,
}

/// Build a [`Preview`] from extracted text.
pub fn preview(description: &str, text: &str, document_count: usize) -> Preview {
    let trimmed = text.trim();
    let character_count = trimmed.chars().count();
    let mut text_preview: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    if character_count > PREVIEW_CHARS {
        text_preview.push_str("...");
    }

    Preview {
        source: description.to_string(),
        text_preview,
        character_count,
        document_count,
    }
}
