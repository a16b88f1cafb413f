//! medbot binary: stdin chat REPL and document ingestion.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use embedding::{EmbeddingConfig, EnvEmbeddingConfig, OpenAIEmbedding};
use llm_client::{EnvLlmConfig, LlmConfig, OpenAILlmClient};
use tracing::info;

use medbot::config::EnvAssistantConfig;
use medbot::templates::Language;
use medbot::{Assistant, DocumentStore};

#[derive(Parser)]
#[command(name = "medbot", about = "Consent-gated medical assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat on stdin/stdout.
    Chat {
        /// User identifier.
        #[arg(long)]
        user: String,
        /// Session identifier; generated when omitted.
        #[arg(long)]
        session: Option<String>,
        /// Response language (en/hi); overrides LANGUAGE.
        #[arg(long)]
        language: Option<String>,
    },
    /// Chunk a text file and store the chunks in the document store.
    Ingest {
        /// Path to a UTF-8 text file.
        file: PathBuf,
        #[arg(long, default_value_t = 300)]
        chunk_size: usize,
        #[arg(long, default_value_t = 50)]
        overlap: usize,
    },
}

async fn build_assistant(config: &EnvAssistantConfig) -> anyhow::Result<Assistant> {
    let llm_cfg = EnvLlmConfig::from_env()?;
    let emb_cfg = EnvEmbeddingConfig::from_env()?;
    emb_cfg.validate()?;

    let llm = Arc::new(
        OpenAILlmClient::with_base_url(
            llm_cfg.api_key().to_string(),
            llm_cfg.base_url().to_string(),
        )
        .with_model(llm_cfg.model().to_string())
        .with_temperature(llm_cfg.temperature())
        .with_system_prompt_opt(llm_cfg.system_prompt().map(String::from)),
    );

    let embedder = Arc::new(OpenAIEmbedding::new_with_base_url(
        emb_cfg.api_key().to_string(),
        emb_cfg.model().to_string(),
        emb_cfg.base_url(),
    ));

    Assistant::new(config, llm, embedder).await
}

async fn run_chat(
    assistant: &Assistant,
    user: &str,
    session: &str,
    language: Language,
) -> anyhow::Result<()> {
    if let Some(greeting) = assistant.initial_message(user, language).await? {
        println!("{greeting}\n");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        let response = assistant.chat(user, session, message, language).await;
        println!("{response}\n");
    }

    Ok(())
}

async fn run_ingest(
    assistant: &Assistant,
    file: &PathBuf,
    chunk_size: usize,
    overlap: usize,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let chunks = medbot::chunker::chunk_text(&text, chunk_size, overlap);
    let source = file.display().to_string();

    let docstore = assistant.docstore();
    for chunk in &chunks {
        docstore
            .add(chunk, serde_json::json!({ "source": source }))
            .await?;
    }

    info!(file = %source, chunks = chunks.len(), "ingestion complete");
    println!("Ingested {} chunks from {}", chunks.len(), source);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    medbot::logger::init_tracing("medbot.log")?;

    let cli = Cli::parse();
    let config = EnvAssistantConfig::from_env()?;
    config.validate()?;

    let assistant = build_assistant(&config).await?;

    let result = match &cli.command {
        Command::Chat {
            user,
            session,
            language,
        } => {
            let session = session
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let language = language
                .as_deref()
                .map(Language::parse)
                .unwrap_or(config.language);
            run_chat(&assistant, user, &session, language).await
        }
        Command::Ingest {
            file,
            chunk_size,
            overlap,
        } => run_ingest(&assistant, file, *chunk_size, *overlap).await,
    };

    assistant.close().await;
    result
}
