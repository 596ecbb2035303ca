//! # docquery CLI (`docq`)
//!
//! The `docq` binary answers questions about uploaded files: documents go
//! through a persisted semantic index, images through OCR text extraction.
//!
//! ## Usage
//!
//! ```bash
//! docq --config ./config/docq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docq init` | Create the SQLite store and run schema migrations |
//! | `docq ask <file> "<question>"` | Answer one question about a file |
//! | `docq chat <file>` | Interactive question loop over one file |
//! | `docq collections` | List persisted collections |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the store
//! docq init --config ./config/docq.toml
//!
//! # One-shot question about a PDF
//! docq ask ./report.pdf "What was the Q3 revenue?"
//!
//! # Question about an image (OCR path)
//! docq ask ./diagram.png "What does the title say?"
//!
//! # Multi-turn session over the same file
//! docq chat ./report.pdf
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docquery::config::{self, Config};
use docquery::embedding::OpenAiEmbedder;
use docquery::llm::OpenAiChatModel;
use docquery::models::UploadedFile;
use docquery::ocr::TesseractExtractor;
use docquery::session::{Pipeline, SessionState};
use docquery::store::StoreGateway;
use docquery::{db, migrate};

/// docquery CLI — question answering over uploaded documents and images.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docq.example.toml` for a full example. When the file is
/// absent, built-in defaults apply and credentials come from `OPENAI_API_KEY`.
#[derive(Parser)]
#[command(
    name = "docq",
    about = "docquery — content-addressed question answering over documents and images",
    version,
    long_about = "docquery fingerprints each uploaded file by content, chunks and embeds \
    documents into a persisted SQLite index (re-uploads of identical bytes are never \
    re-embedded), and answers questions grounded in retrieved chunks. Images are routed \
    through OCR text extraction instead and never create an index."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docq.toml`. Store, chunking, retrieval,
    /// embedding, model, and OCR settings are read from this file.
    #[arg(long, global = true, default_value = "./config/docq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the artifact store schema.
    ///
    /// Creates the SQLite database file and the collections and chunks
    /// tables. This command is idempotent — running it multiple times is
    /// safe.
    Init,

    /// Answer one question about a file.
    ///
    /// Fingerprints the file, reuses or builds its semantic index (documents)
    /// or runs OCR (images), and prints the grounded answer.
    Ask {
        /// Path to the document or image.
        file: PathBuf,

        /// The question to answer.
        question: String,
    },

    /// Interactive question loop over one file.
    ///
    /// The file is ingested once; subsequent questions reuse the session's
    /// index and carry conversation history. Exit with `quit` or Ctrl-D.
    Chat {
        /// Path to the document or image.
        file: PathBuf,
    },

    /// List persisted collections.
    ///
    /// Shows each collection's identifier, chunk count, and creation time.
    /// Collections are never deleted by docquery; remove the store file to
    /// reclaim space.
    Collections,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.store.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Store initialized at {}", cfg.store.path.display());
        }
        Commands::Ask { file, question } => {
            let pipeline = build_pipeline(cfg).await?;
            let state = run_one(&pipeline, SessionState::default(), &file, &question).await?;
            print_answer(&state);
        }
        Commands::Chat { file } => {
            let pipeline = build_pipeline(cfg).await?;
            chat_loop(&pipeline, &file).await?;
        }
        Commands::Collections => {
            // Listing needs the store but never embeds; a placeholder
            // provider keeps credentials optional here.
            let gateway =
                StoreGateway::connect(&cfg.store.path, Arc::new(NullEmbedder)).await?;
            let collections = gateway.list_collections().await?;
            if collections.is_empty() {
                println!("No collections found.");
            } else {
                println!("{:<70} {:>8} {:>12}", "COLLECTION", "CHUNKS", "CREATED");
                for info in collections {
                    let created = chrono::DateTime::from_timestamp(info.created_at, 0)
                        .map(|t| t.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{:<70} {:>8} {:>12}", info.id, info.chunk_count, created);
                }
            }
        }
    }

    Ok(())
}

/// Construct every external collaborator once and assemble the pipeline.
async fn build_pipeline(config: Config) -> Result<Pipeline> {
    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let model = Arc::new(OpenAiChatModel::new(&config.model)?);
    let extractor = Arc::new(TesseractExtractor::new(&config.ocr));
    let gateway = StoreGateway::connect(&config.store.path, embedder).await?;

    Ok(Pipeline {
        config,
        gateway,
        model,
        extractor,
    })
}

/// Run a single turn and return the updated session state.
async fn run_one(
    pipeline: &Pipeline,
    state: SessionState,
    file: &Path,
    question: &str,
) -> Result<SessionState> {
    let upload = UploadedFile::new(file);
    pipeline.run_turn(state, question, &upload).await
}

fn print_answer(state: &SessionState) {
    match &state.answer {
        Some(answer) => println!("{}", answer),
        None => println!("No answer produced."),
    }
}

/// Read questions from stdin until EOF or `quit`, carrying session state
/// (index handle, fingerprint, history) across turns.
async fn chat_loop(pipeline: &Pipeline, file: &Path) -> Result<()> {
    let stdin = std::io::stdin();
    let mut state = SessionState::default();

    println!("Chatting about {} (type 'quit' to exit)", file.display());
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("quit") || question.eq_ignore_ascii_case("exit") {
            break;
        }

        state = run_one(pipeline, state, file, question).await?;
        print_answer(&state);
    }

    Ok(())
}

/// Embedder stand-in for commands that read the store but never embed.
struct NullEmbedder;

#[async_trait::async_trait]
impl docquery::embedding::Embedder for NullEmbedder {
    fn model_name(&self) -> &str {
        "none"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding provider not configured for this command")
    }
}
