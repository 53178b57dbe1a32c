//! # docqa CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Start the HTTP API |
//! | `docqa chat <pdf\|image\|url\|text> <value>` | Load one source and chat about it |
//! | `docqa ask --text\|--url\|--file <value> "<question>"` | One-shot question |
//! | `docqa config-check` | Validate the configuration |
//!
//! ## Examples
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! docqa chat pdf ./paper.pdf
//! docqa ask --url https://en.wikipedia.org/wiki/Rayleigh_scattering "Why is the sky blue?"
//! docqa serve --config ./config/docqa.toml
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use docqa::assistant::Assistant;
use docqa::config::{self, Config};
use docqa::ingest::SourceInput;
use docqa::{chat, logging, server};

/// Ask questions about PDFs, images, web pages, and text, with live web
/// search when the documents do not have the answer.
#[derive(Parser)]
#[command(name = "docqa", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml` when it exists, otherwise built-in
    /// defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Load one source and answer questions interactively.
    ///
    /// Type `exit` or `quit` (or send EOF) to leave.
    Chat {
        /// Source type: `pdf`, `image`, `url`, or `text`.
        kind: String,
        /// File path, URL, or the text itself.
        value: String,
    },

    /// Load one source and answer a single question.
    Ask {
        #[command(flatten)]
        source: AskSource,
        /// The question.
        question: String,
    },

    /// Load and validate the configuration, then print it.
    ConfigCheck,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct AskSource {
    /// Raw text to ask about.
    #[arg(long)]
    text: Option<String>,
    /// Web page to ask about.
    #[arg(long)]
    url: Option<String>,
    /// PDF or image file to ask about.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl AskSource {
    fn into_input(self) -> anyhow::Result<SourceInput> {
        if let Some(text) = self.text {
            return Ok(SourceInput::Text(text));
        }
        if let Some(url) = self.url {
            return Ok(SourceInput::Url(url));
        }
        match self.file {
            Some(path) => {
                let kind = if path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
                {
                    "pdf"
                } else {
                    "image"
                };
                SourceInput::from_cli(kind, &path.to_string_lossy())
            }
            None => anyhow::bail!("one of --text, --url, or --file is required"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    logging::init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chat { kind, value } => {
            let input = SourceInput::from_cli(&kind, &value)?;
            let assistant = Assistant::from_config(&cfg)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            chat::run_chat(&assistant, input, stdin, &mut stdout).await?;
        }
        Commands::Ask { source, question } => {
            let input = source.into_input()?;
            let assistant = Assistant::from_config(&cfg)?;
            chat::run_ask(&assistant, input, &question).await?;
        }
        Commands::ConfigCheck => {
            print_config(&cfg);
        }
    }

    Ok(())
}

fn print_config(cfg: &Config) {
    let key_state = if cfg.credentials.resolve().is_ok() {
        "set"
    } else {
        "missing"
    };

    println!("Configuration OK");
    println!("  server.bind              {}", cfg.server.bind);
    println!("  server.max_upload_bytes  {}", cfg.server.max_upload_bytes);
    println!(
        "  chunking                 size {} / overlap {}",
        cfg.chunking.chunk_size, cfg.chunking.overlap
    );
    println!("  retrieval.top_k          {}", cfg.retrieval.top_k);
    println!(
        "  embedding                {} {}",
        cfg.embedding.provider,
        cfg.embedding.model.as_deref().unwrap_or("(default model)")
    );
    println!(
        "  generation               {} {} (vision: {}, temperature {})",
        cfg.generation.provider,
        cfg.generation.model,
        cfg.generation.vision_model,
        cfg.generation.temperature
    );
    println!(
        "  web_search               {} (max {} results)",
        cfg.web_search.provider, cfg.web_search.max_results
    );
    println!(
        "  answer                   detection {:?}, structured {}, knowledge on search error {}",
        cfg.answer.not_found_detection,
        cfg.answer.structured_output,
        cfg.answer.model_knowledge_on_search_error
    );
    println!(
        "  credentials              {} ({})",
        cfg.credentials.api_key_env, key_state
    );
}
