//! End-to-end pipeline tests over in-process fakes: upload, retrieval,
//! answering with web fallback, and session isolation.

mod common;

use common::*;
use docqa::config::Config;
use docqa::error::RagError;
use docqa::ingest::SourceInput;
use docqa::retrieve::{embed_chunks, retrieve};
use docqa::session::Session;
use docqa_core::chunk::{chunk_text, ChunkParams};
use docqa_core::models::{AnswerSource, SourceKind};
use docqa_core::prompt::NOT_FOUND_SENTINEL;
use std::sync::atomic::Ordering;

const SKY: &str = "The sky is blue because of Rayleigh scattering.";

// ─── Scenarios ──────────────────────────────────────────────────────

/// Text upload, then a question the text answers: document path, the
/// source is cited, and the web is never consulted.
#[tokio::test]
async fn scenario_document_answer_without_web_call() {
    let h = harness();
    let up = h
        .assistant
        .upload(SourceInput::Text(SKY.into()))
        .await
        .unwrap();

    let answer = h.assistant.ask(&up.session_id, "Why is the sky blue?").await.unwrap();

    assert_eq!(answer.source, AnswerSource::Document);
    assert!(answer.text.contains("Rayleigh"));
    assert!(!answer.fell_back);
    assert!(!answer.not_found);
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].source_name, "Custom text");
    assert_eq!(answer.citations[0].source_kind, SourceKind::Text);
    assert_eq!(h.searcher.calls(), 0);

    let history = h.assistant.history(&up.session_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, AnswerSource::Document);
}

/// Empty session: retrieval is empty, so the answer comes from the web.
#[tokio::test]
async fn scenario_empty_session_uses_web() {
    let h = harness();
    let id = h.assistant.create_session();

    let answer = h
        .assistant
        .ask(&id, "What is the capital of France?")
        .await
        .unwrap();

    assert_eq!(answer.source, AnswerSource::Web);
    assert_eq!(answer.text, WEB_ANSWER);
    assert!(answer.fell_back);
    assert!(!answer.not_found);
    assert_eq!(answer.web_results.len(), 1);
    assert_eq!(answer.web_results[0].url, "https://en.wikipedia.org/wiki/Paris");
    assert_eq!(h.searcher.calls(), 1);
    // No document prompt and no query embedding for an empty index.
    assert_eq!(h.generator.count_containing("Use the following pieces of context"), 0);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

/// A corrupt PDF added to an existing session fails extraction and
/// leaves the session exactly as it was.
#[tokio::test]
async fn scenario_corrupt_pdf_leaves_session_unchanged() {
    let h = harness();
    let up = h
        .assistant
        .upload(SourceInput::Text(SKY.into()))
        .await
        .unwrap();
    let before = h.assistant.info(&up.session_id).await.unwrap();
    let embed_calls = h.embedder.calls.load(Ordering::SeqCst);

    let err = h
        .assistant
        .add_context(
            &up.session_id,
            SourceInput::File {
                bytes: b"%PDF-1.4\n1 0 obj << /Type /Catalog garbage".to_vec(),
                name: "broken.pdf".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Extraction(_)), "got {:?}", err);

    let after = h.assistant.info(&up.session_id).await.unwrap();
    assert_eq!(after.source_count, before.source_count);
    assert_eq!(after.chunk_count, before.chunk_count);
    assert_eq!(after.summary, before.summary);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embed_calls);
}

// ─── Fallback trigger ───────────────────────────────────────────────

/// The sentinel from the document path sends the question to the web.
#[tokio::test]
async fn sentinel_answer_falls_back_to_web() {
    let generator = ScriptedGenerator::default();
    *generator.document_reply.lock().unwrap() = Some(NOT_FOUND_SENTINEL.to_string());
    let h = harness_with(&Config::default(), generator, StaticSearcher::paris());
    let up = h
        .assistant
        .upload(SourceInput::Text(SKY.into()))
        .await
        .unwrap();

    let answer = h
        .assistant
        .ask(&up.session_id, "What is the capital of France?")
        .await
        .unwrap();

    assert_eq!(answer.source, AnswerSource::Web);
    assert_eq!(answer.text, WEB_ANSWER);
    assert!(answer.not_found);
    assert!(answer.fell_back);
    assert!(answer.citations.is_empty());
    assert_eq!(h.searcher.calls(), 1);

    let history = h.assistant.history(&up.session_id).await.unwrap();
    assert_eq!(history[0].source, AnswerSource::Web);
}

/// A document answer without the sentinel never triggers a search, even in
/// sentinel mode when the text merely quotes "not available".
#[tokio::test]
async fn sentinel_mode_ignores_heuristic_phrases() {
    let mut config = Config::default();
    config.answer.not_found_detection = docqa_core::prompt::NotFoundDetection::Sentinel;
    let generator = ScriptedGenerator::default();
    *generator.document_reply.lock().unwrap() =
        Some("Blue light is scattered; red light is not available to the eye at noon.".into());
    let h = harness_with(&config, generator, StaticSearcher::paris());

    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    let answer = h.assistant.ask(&up.session_id, "Why is the sky blue?").await.unwrap();

    assert_eq!(answer.source, AnswerSource::Document);
    assert_eq!(h.searcher.calls(), 0);
}

/// Heuristic mode (default) treats the same phrasing as "not found".
#[tokio::test]
async fn heuristic_mode_matches_phrases() {
    let generator = ScriptedGenerator::default();
    *generator.document_reply.lock().unwrap() =
        Some("That information is not available in the text.".into());
    let h = harness_with(&Config::default(), generator, StaticSearcher::paris());

    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    let answer = h.assistant.ask(&up.session_id, "Who painted it?").await.unwrap();

    assert_eq!(answer.source, AnswerSource::Web);
    assert!(answer.not_found);
    assert_eq!(h.searcher.calls(), 1);
}

/// Structured replies decide by their flag, not by phrases.
#[tokio::test]
async fn structured_output_flag_decides() {
    let mut config = Config::default();
    config.answer.structured_output = true;

    let generator = ScriptedGenerator {
        structured: true,
        ..Default::default()
    };
    *generator.document_reply.lock().unwrap() = Some(
        r#"{"answer": "It does not contain errors; the sky is blue.", "found_in_context": true}"#
            .into(),
    );
    let h = harness_with(&config, generator, StaticSearcher::paris());
    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    let answer = h.assistant.ask(&up.session_id, "Why is the sky blue?").await.unwrap();
    assert_eq!(answer.source, AnswerSource::Document);
    assert_eq!(answer.text, "It does not contain errors; the sky is blue.");
    assert_eq!(h.searcher.calls(), 0);
    assert!(h.generator.count_containing("found_in_context") >= 1);

    *h.generator.document_reply.lock().unwrap() =
        Some(r#"{"answer": "", "found_in_context": false}"#.into());
    let answer = h.assistant.ask(&up.session_id, "Capital of France?").await.unwrap();
    assert_eq!(answer.source, AnswerSource::Web);
    assert_eq!(h.searcher.calls(), 1);
}

/// No web results: the model answers from general knowledge, tagged `none`.
#[tokio::test]
async fn empty_search_results_answer_from_general_knowledge() {
    let h = harness_with(
        &Config::default(),
        ScriptedGenerator::default(),
        StaticSearcher::empty(),
    );
    let id = h.assistant.create_session();
    let answer = h.assistant.ask(&id, "What is the capital of France?").await.unwrap();

    assert_eq!(answer.source, AnswerSource::None);
    assert_eq!(answer.text, GENERAL_ANSWER);
    assert!(answer.notice.is_some());
    assert_eq!(h.assistant.history(&id).await.unwrap().len(), 1);
}

/// A failing search aborts the turn by default and records nothing.
#[tokio::test]
async fn search_failure_aborts_turn() {
    let h = harness_with(
        &Config::default(),
        ScriptedGenerator::default(),
        StaticSearcher::failing(),
    );
    let id = h.assistant.create_session();
    let err = h.assistant.ask(&id, "What is the capital of France?").await.unwrap_err();

    assert!(matches!(err, RagError::SearchService(_)));
    assert!(h.assistant.history(&id).await.unwrap().is_empty());
}

/// With the opt-in, a failing search degrades to general knowledge.
#[tokio::test]
async fn search_failure_can_degrade_to_general_knowledge() {
    let mut config = Config::default();
    config.answer.model_knowledge_on_search_error = true;
    let h = harness_with(&config, ScriptedGenerator::default(), StaticSearcher::failing());

    let id = h.assistant.create_session();
    let answer = h.assistant.ask(&id, "What is the capital of France?").await.unwrap();

    assert_eq!(answer.source, AnswerSource::None);
    assert!(answer.notice.unwrap().contains("Web search unavailable"));
}

/// Generation failure on the answer path: error, no chat turn.
#[tokio::test]
async fn generation_failure_records_no_turn() {
    let h = harness();
    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    h.generator.fail_answers.store(true, Ordering::SeqCst);

    let err = h.assistant.ask(&up.session_id, "Why is the sky blue?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
    assert!(h.assistant.history(&up.session_id).await.unwrap().is_empty());
    assert_eq!(h.searcher.calls(), 0);
}

#[tokio::test]
async fn blank_question_is_invalid_input() {
    let h = harness();
    let id = h.assistant.create_session();
    let err = h.assistant.ask(&id, "   ").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

// ─── Retrieval properties ───────────────────────────────────────────

fn long_document() -> String {
    (0..40)
        .map(|i| {
            format!(
                "Paragraph {} talks about topic{} with unique marker word{} repeated word{}.",
                i, i, i, i
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn indexed_session(text: &str, params: ChunkParams) -> (Session, HashEmbedder) {
    let embedder = HashEmbedder::default();
    let mut session = Session::new();
    let source = docqa_core::models::Source {
        id: "src-1".into(),
        kind: SourceKind::Text,
        name: "Custom text".into(),
        text: text.into(),
        page_count: 1,
        content_hash: String::new(),
        created_at: chrono::Utc::now(),
    };
    let chunks = chunk_text(&source.id, text, params);
    let entries = embed_chunks(&embedder, chunks, 7).await.unwrap();
    session.add_source(source, entries).unwrap();
    (session, embedder)
}

#[tokio::test]
async fn retrieval_on_empty_index_is_empty_and_skips_embedding() {
    let embedder = HashEmbedder::default();
    let session = Session::new();
    let hits = retrieve(&embedder, &session, "anything", 3).await.unwrap();
    assert!(hits.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retrieval_returns_at_most_k_in_descending_order() {
    let params = ChunkParams {
        chunk_size: 120,
        overlap: 20,
    };
    let (session, embedder) = indexed_session(&long_document(), params).await;
    assert!(session.index.len() > 5);

    for k in [1, 3, 5, 1000] {
        let hits = retrieve(&embedder, &session, "topic7 marker word7", k).await.unwrap();
        assert!(hits.len() <= k);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[tokio::test]
async fn identical_text_query_ranks_its_chunk_first() {
    let params = ChunkParams {
        chunk_size: 120,
        overlap: 20,
    };
    let (session, embedder) = indexed_session(&long_document(), params).await;
    let all = chunk_text("src-1", &long_document(), params);

    for target in [&all[0], &all[all.len() / 2], &all[all.len() - 1]] {
        let hits = retrieve(&embedder, &session, &target.text, 3).await.unwrap();
        assert_eq!(hits[0].chunk.id, target.id);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].source_name, "Custom text");
    }
}

#[tokio::test]
async fn embedding_is_batched() {
    let params = ChunkParams {
        chunk_size: 120,
        overlap: 20,
    };
    let (session, embedder) = indexed_session(&long_document(), params).await;
    let chunks = session.index.len();
    assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), chunks);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), chunks.div_ceil(7));
}

// ─── Sessions ───────────────────────────────────────────────────────

#[tokio::test]
async fn sessions_do_not_see_each_other() {
    let h = harness();
    let sky = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    let other = h
        .assistant
        .upload(SourceInput::Text(
            "Bread is made from flour, water, salt, and yeast. It is baked in an oven.".into(),
        ))
        .await
        .unwrap();

    let answer = h.assistant.ask(&other.session_id, "Why is the sky blue?").await.unwrap();
    // Only the bread text is retrievable, so the scripted model cannot find Rayleigh.
    assert_eq!(answer.source, AnswerSource::Web);
    assert!(answer.not_found);

    let answer = h.assistant.ask(&sky.session_id, "Why is the sky blue?").await.unwrap();
    assert_eq!(answer.source, AnswerSource::Document);
}

#[tokio::test]
async fn failed_embedding_creates_no_session_and_changes_nothing() {
    let h = harness();
    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();

    h.embedder.fail.store(true, Ordering::SeqCst);
    let err = h
        .assistant
        .upload(SourceInput::Text("Another document.".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingService(_)));

    let err = h
        .assistant
        .add_context(&up.session_id, SourceInput::Text("More text.".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingService(_)));

    assert_eq!(h.assistant.list().await.len(), 1);
    let info = h.assistant.info(&up.session_id).await.unwrap();
    assert_eq!(info.source_count, 1);
    assert_eq!(info.chunk_count, 1);
}

#[tokio::test]
async fn add_context_to_missing_session_fails_fast() {
    let h = harness();
    let err = h
        .assistant
        .add_context("no-such-session", SourceInput::Text(SKY.into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::SessionNotFound(_)));
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summaries_follow_sources() {
    let h = harness();
    // Short text is its own summary.
    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    assert_eq!(up.summary, SKY);

    // Longer combined text is summarized by the model with the mixed prompt.
    let long = "Sunsets look red because light travels through more air. ".repeat(5);
    let added = h
        .assistant
        .add_context(&up.session_id, SourceInput::Text(long.clone()))
        .await
        .unwrap();
    assert_eq!(added.summary, SUMMARY);
    assert_eq!(added.preview.character_count, long.trim().chars().count());
    assert_eq!(h.generator.count_containing("combined content from multiple sources"), 1);

    let info = h.assistant.info(&up.session_id).await.unwrap();
    assert_eq!(info.source_count, 2);
    assert_eq!(info.summary.as_deref(), Some(SUMMARY));
}

#[tokio::test]
async fn image_upload_goes_through_ocr() {
    let h = harness();
    let up = h
        .assistant
        .upload(SourceInput::File {
            bytes: vec![0x89, b'P', b'N', b'G', 0, 0],
            name: "invoice.png".into(),
        })
        .await
        .unwrap();
    assert_eq!(up.source.kind, SourceKind::Image);

    let answer = h.assistant.ask(&up.session_id, "What is the total due?").await.unwrap();
    assert_eq!(answer.source, AnswerSource::Document);
    assert!(answer.text.contains("10 dollars"));
}

#[tokio::test]
async fn pdf_upload_extracts_text() {
    let h = harness();
    let pdf = minimal_pdf_with_phrase("Rayleigh scattering explains the blue sky");
    let up = h
        .assistant
        .upload(SourceInput::File {
            bytes: pdf,
            name: "physics.pdf".into(),
        })
        .await
        .unwrap();
    assert_eq!(up.source.kind, SourceKind::Pdf);
    assert_eq!(up.source.page_count, 1);

    let answer = h.assistant.ask(&up.session_id, "Why is the sky blue?").await.unwrap();
    assert_eq!(answer.source, AnswerSource::Document);
    assert_eq!(answer.citations[0].source_name, "physics.pdf");
}

#[tokio::test]
async fn unsupported_upload_is_rejected_before_any_work() {
    let h = harness();
    let err = h
        .assistant
        .upload(SourceInput::File {
            bytes: b"PK\x03\x04".to_vec(),
            name: "slides.pptx".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::UnsupportedFormat(_)));
    assert!(h.assistant.list().await.is_empty());
    assert!(h.generator.prompts().is_empty());
}

#[tokio::test]
async fn delete_removes_session() {
    let h = harness();
    let id = h.assistant.create_session();
    h.assistant.delete(&id).unwrap();
    assert!(matches!(
        h.assistant.ask(&id, "q").await,
        Err(RagError::SessionNotFound(_))
    ));
    assert!(matches!(h.assistant.delete(&id), Err(RagError::SessionNotFound(_))));
}

#[test]
fn sentinel_constant_is_what_the_prompt_asks_for() {
    let prompt = docqa_core::prompt::document_prompt(&[], "q", false);
    assert!(prompt.contains(NOT_FOUND_SENTINEL));
}

#[tokio::test]
async fn chat_loop_answers_until_exit() {
    let h = harness();
    let input: &[u8] = b"Why is the sky blue?\n\nWhat is the capital of France?\nexit\nnever asked\n";
    let mut out = Vec::new();

    docqa::chat::run_chat(&h.assistant, SourceInput::Text(SKY.into()), input, &mut out)
        .await
        .unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Loaded Custom text (1 chunks)."));
    assert!(out.contains("Answer (from your documents): The sky is blue"));
    assert!(out.ends_with("Goodbye!\n"));
    assert!(!out.contains("never asked"));
    // The blank line is skipped; two questions reach the model.
    assert_eq!(h.generator.count_containing("Question: "), 2);
}

#[tokio::test]
async fn session_reads_do_not_wait_for_an_answer_in_flight() {
    let h = harness();
    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    h.generator.hold_answers.store(true, Ordering::SeqCst);

    let assistant = h.assistant.clone();
    let id = up.session_id.clone();
    let pending = tokio::spawn(async move { assistant.ask(&id, "Why is the sky blue?").await });
    h.generator.entered.notified().await;

    let wait = std::time::Duration::from_secs(2);
    let listing = tokio::time::timeout(wait, h.assistant.list())
        .await
        .expect("listing waited on the model call");
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].turn_count, 0);
    let info = tokio::time::timeout(wait, h.assistant.info(&up.session_id))
        .await
        .expect("info waited on the model call")
        .unwrap();
    assert_eq!(info.chunk_count, 1);
    tokio::time::timeout(wait, h.assistant.history(&up.session_id))
        .await
        .expect("history waited on the model call")
        .unwrap();

    h.generator.release.notify_one();
    let answer = pending.await.unwrap().unwrap();
    assert_eq!(answer.source, AnswerSource::Document);
    assert_eq!(h.assistant.info(&up.session_id).await.unwrap().turn_count, 1);
}

#[tokio::test]
async fn add_context_during_a_question_is_not_blocked() {
    let h = harness();
    let up = h.assistant.upload(SourceInput::Text(SKY.into())).await.unwrap();
    h.generator.hold_answers.store(true, Ordering::SeqCst);

    let assistant = h.assistant.clone();
    let id = up.session_id.clone();
    let pending = tokio::spawn(async move { assistant.ask(&id, "Why is the sky blue?").await });
    h.generator.entered.notified().await;

    let added = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        h.assistant
            .add_context(&up.session_id, SourceInput::Text("Sunsets are red.".into())),
    )
    .await
    .expect("add_context waited on the model call")
    .unwrap();
    assert_eq!(added.chunk_count, 1);

    h.generator.release.notify_one();
    pending.await.unwrap().unwrap();
    let info = h.assistant.info(&up.session_id).await.unwrap();
    assert_eq!(info.source_count, 2);
    assert_eq!(info.turn_count, 1);
}
