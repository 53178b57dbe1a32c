//! Terminal front-end: `docqa chat` (interactive) and `docqa ask` (one-shot).

use std::io::Write;

use anyhow::Result;
use docqa_core::models::AnswerSource;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::answer::Answer;
use crate::assistant::Assistant;
use crate::ingest::SourceInput;

/// Ingest `input`, print its summary, then answer questions read from
/// `reader` until `exit`, `quit`, or end of input.
pub async fn run_chat<R, W>(
    assistant: &Assistant,
    input: SourceInput,
    reader: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let outcome = assistant.upload(input).await?;
    writeln!(out, "Loaded {} ({} chunks).", outcome.source.name, outcome.chunk_count)?;
    writeln!(out, "\nSummary:\n{}\n", outcome.summary)?;

    let mut lines = reader.lines();
    loop {
        write!(out, "Ask a question (or type 'exit' to quit): ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        // A failed turn is reported and the loop goes on.
        match assistant.ask(&outcome.session_id, question).await {
            Ok(answer) => writeln!(out, "\n{}\n", render_answer(&answer))?,
            Err(e) => writeln!(out, "\nError: {}\n", e)?,
        }
    }

    writeln!(out, "Goodbye!")?;
    Ok(())
}

/// Ingest `input` and answer a single question.
pub async fn run_ask(assistant: &Assistant, input: SourceInput, question: &str) -> Result<()> {
    let outcome = assistant.upload(input).await?;
    let answer = assistant.ask(&outcome.session_id, question).await?;
    println!("{}", render_answer(&answer));
    Ok(())
}

/// Answer text prefixed by where it came from, with sources listed.
pub fn render_answer(answer: &Answer) -> String {
    let mut out = match answer.source {
        AnswerSource::Document => format!("Answer (from your documents): {}", answer.text),
        AnswerSource::Web => format!("Answer (from web search): {}", answer.text),
        AnswerSource::None => format!("Answer (general knowledge): {}", answer.text),
    };

    if let Some(notice) = &answer.notice {
        out.push_str(&format!("\nNote: {}", notice));
    }
    for c in &answer.citations {
        out.push_str(&format!(
            "\n  - {} (chunk {}, score {:.2})",
            c.source_name, c.chunk_index, c.score
        ));
    }
    for (i, r) in answer.web_results.iter().enumerate() {
        out.push_str(&format!("\n  [{}] {} {}", i + 1, r.title, r.url));
    }
    out
}
