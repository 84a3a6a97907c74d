//! docchat CLI
//!
//! Non-interactive companion to the chat REPL. Prints JSON on stdout for use
//! from scripts.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use docchat_lib::cli::{init_tracing, settings_from_args, GradientArgs, SplitterArgs};
use docchat_lib::documents::{load_pdf, select_upload, SearchResult};
use docchat_lib::{count_tokens, split_text, Pipeline, Session, TurnOutcome};

#[derive(Parser)]
#[command(name = "docchat-cli")]
#[command(about = "docchat CLI - ask questions about a PDF and inspect how it is split", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a PDF and answer one question about it
    Ask {
        /// PDF to index
        file: PathBuf,
        /// Question to answer
        question: String,
        #[command(flatten)]
        gradient: GradientArgs,
        #[command(flatten)]
        splitter: SplitterArgs,
    },
    /// Show how a PDF is split into segments (no network)
    Split {
        /// PDF to split
        file: PathBuf,
        #[command(flatten)]
        splitter: SplitterArgs,
    },
    /// Token counting commands
    Tokens {
        #[command(subcommand)]
        action: TokensAction,
    },
}

#[derive(Subcommand)]
enum TokensAction {
    /// Count tokens in text
    Count {
        /// Text to count (or - to read from stdin)
        text: String,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskOutput {
    document: String,
    question: String,
    answer: String,
    sources: Vec<SearchResult>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentOutput {
    index: u32,
    token_count: u32,
    start_pos: usize,
    end_pos: usize,
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitOutput {
    document: String,
    chunk_size: u32,
    chunk_overlap: u32,
    total_tokens: u32,
    segments: Vec<SegmentOutput>,
}

#[derive(Serialize)]
struct TokenCountOutput {
    tokens: u32,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing("warn");

    let result = match cli.command {
        Commands::Ask { file, question, gradient, splitter } => handle_ask(file, question, gradient, splitter).await,
        Commands::Split { file, splitter } => handle_split(file, splitter),
        Commands::Tokens { action } => handle_tokens(action),
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: e.to_string() };
            match serde_json::to_string(&error) {
                Ok(json) => println!("{}", json),
                Err(_) => println!(r#"{{"error": "unknown error"}}"#),
            }
            std::process::exit(1);
        }
    }
}

// ============ Handlers ============

async fn handle_ask(
    file: PathBuf,
    question: String,
    gradient: GradientArgs,
    splitter: SplitterArgs,
) -> anyhow::Result<String> {
    let settings = settings_from_args(&gradient, &splitter)?;
    let pipeline = Pipeline::from_settings(&settings)?;

    let mut session = Session::new();
    session.select_file(&[file])?;
    let document = session.process_selected(&pipeline).await?;

    match session.ask(&question).await? {
        TurnOutcome::Answered(answer) => {
            let output = AskOutput {
                document: document.filename,
                question,
                answer: answer.text,
                sources: answer.sources,
            };
            Ok(serde_json::to_string(&output)?)
        }
        // process_selected succeeded, so an engine is installed
        TurnOutcome::UploadPrompt => anyhow::bail!("document was not indexed"),
    }
}

fn handle_split(file: PathBuf, splitter: SplitterArgs) -> anyhow::Result<String> {
    let config = splitter.splitter();
    config.validate()?;

    // Same type, size and signature checks as an upload
    select_upload(&[file.clone()])?;
    let document = load_pdf(&file)?;
    let chunks = split_text(&document.text, &config);

    let output = SplitOutput {
        document: document.filename,
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
        total_tokens: count_tokens(&document.text),
        segments: chunks
            .into_iter()
            .map(|c| SegmentOutput {
                index: c.index,
                token_count: c.token_count,
                start_pos: c.start_pos,
                end_pos: c.end_pos,
                content: c.content,
            })
            .collect(),
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_tokens(action: TokensAction) -> anyhow::Result<String> {
    match action {
        TokensAction::Count { text } => {
            let input = if text == "-" {
                use std::io::Read;
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            } else {
                text
            };

            let output = TokenCountOutput { tokens: count_tokens(&input) };
            Ok(serde_json::to_string(&output)?)
        }
    }
}
