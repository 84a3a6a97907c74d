//! docchat
//!
//! Terminal chat over a single PDF: select a file, index it, then ask
//! questions about it.

use std::borrow::Cow::{self, Borrowed, Owned};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing::{debug, warn};

use docchat_lib::cli::{init_tracing, settings_from_args, GradientArgs, SplitterArgs};
use docchat_lib::{ChatRenderer, Pipeline, Session, TurnOutcome, UPLOAD_PROMPT};

const COMMANDS: &[&str] = &["/upload", "/process", "/history", "/status", "/help", "/quit", "/exit"];

#[derive(Parser, Debug)]
#[command(name = "docchat", version, about = "Chat with a PDF using retrieval-augmented generation")]
struct Args {
    /// PDF to select at startup
    #[arg(long, env = "DOCCHAT_FILE")]
    file: Option<PathBuf>,

    /// Index the selected file before the first prompt
    #[arg(long, requires = "file")]
    process: bool,

    #[command(flatten)]
    gradient: GradientArgs,

    #[command(flatten)]
    splitter: SplitterArgs,

    /// Disable coloured output
    #[arg(long, env = "NO_COLOR")]
    no_color: bool,
}

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Upload(&'a str),
    Process,
    History,
    Status,
    Help,
    Quit,
    Unknown(&'a str),
    Question(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Question(line));
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    Some(match name {
        "/upload" => Command::Upload(rest),
        "/process" => Command::Process,
        "/history" => Command::History,
        "/status" => Command::Status,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other),
    })
}

/// Completion, highlighting and hints for slash commands.
struct ReplHelper {
    color: bool,
}

impl Helper for ReplHelper {}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, vec![]));
        }

        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for ReplHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if self.color && line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        self.color
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for ReplHelper {}

fn history_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("docchat").join("history.txt"))
}

fn print_help(renderer: &ChatRenderer, out: &mut impl Write) -> io::Result<()> {
    for line in [
        "/upload <path>  select the PDF to chat with",
        "/process        index the selected PDF",
        "/history        show the conversation so far",
        "/status         show the selected and indexed document",
        "/help           show this list",
        "/quit           leave (also /exit or Ctrl-D)",
        "Anything else is a question about the indexed document.",
    ] {
        renderer.render_notice(line, out)?;
    }
    Ok(())
}

fn print_status(session: &Session, renderer: &ChatRenderer, out: &mut impl Write) -> io::Result<()> {
    match session.selected() {
        Some(upload) => renderer.render_notice(&format!("Selected: {} ({} bytes)", upload.name(), upload.len()), out)?,
        None => renderer.render_notice("Selected: none", out)?,
    }
    match session.document() {
        Some(document) => renderer.render_document(document, out)?,
        None => renderer.render_notice("Indexed: none", out)?,
    }
    renderer.render_notice(&format!("Messages: {}", session.transcript().len()), out)
}

fn select(session: &mut Session, path: &Path, renderer: &ChatRenderer, out: &mut impl Write) -> io::Result<()> {
    match session.select_path(path) {
        Ok(upload) => {
            let notice = format!("Selected {}. Type /process to index it.", upload.name());
            renderer.render_notice(&notice, out)
        }
        Err(e) => renderer.render_error(&e.to_string(), out),
    }
}

async fn process(session: &mut Session, pipeline: &Pipeline, renderer: &ChatRenderer, out: &mut impl Write) -> io::Result<()> {
    if let Some(upload) = session.selected() {
        renderer.render_notice(&format!("Processing {}...", upload.name()), out)?;
        out.flush()?;
    }
    match session.process_selected(pipeline).await {
        Ok(document) => renderer.render_document(&document, out),
        Err(e) => renderer.render_error(&e.to_string(), out),
    }
}

async fn ask(session: &mut Session, question: &str, renderer: &ChatRenderer, out: &mut impl Write) -> io::Result<()> {
    match session.ask(question).await {
        Ok(TurnOutcome::Answered(_)) => {
            // The turn just appended the question and its answer
            let messages = session.transcript().messages();
            for message in &messages[messages.len().saturating_sub(2)..] {
                renderer.render_message(message, out)?;
            }
            Ok(())
        }
        Ok(TurnOutcome::UploadPrompt) => renderer.render_notice(UPLOAD_PROMPT, out),
        Err(e) => renderer.render_error(&e.to_string(), out),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing("docchat=info");

    let color = !args.no_color && io::stdout().is_terminal();
    colored::control::set_override(color);
    let renderer = ChatRenderer::new(color);

    let settings = settings_from_args(&args.gradient, &args.splitter).context("invalid configuration")?;
    debug!(?settings, "Loaded settings");
    let pipeline = Pipeline::from_settings(&settings).context("failed to create Gradient client")?;

    let mut session = Session::new();
    let mut out = io::stdout();

    println!("{}", "=== docchat ===".bright_magenta().bold());
    renderer.render_notice("Select a PDF with /upload <path>, then /process. /help lists commands.", &mut out)?;
    println!();

    if let Some(path) = &args.file {
        select(&mut session, path, &renderer, &mut out)?;
        if args.process && session.selected().is_some() {
            process(&mut session, &pipeline, &renderer, &mut out).await?;
        }
    }

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ReplHelper { color }));

    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                let Some(command) = parse_command(&line) else {
                    continue;
                };
                let _ = rl.add_history_entry(line.trim());

                match command {
                    Command::Upload("") => renderer.render_error("Usage: /upload <path>", &mut out)?,
                    Command::Upload(path) => select(&mut session, Path::new(path), &renderer, &mut out)?,
                    Command::Process => process(&mut session, &pipeline, &renderer, &mut out).await?,
                    Command::History => {
                        if session.transcript().is_empty() {
                            renderer.render_notice("No messages yet.", &mut out)?;
                        } else {
                            renderer.render(session.transcript(), &mut out)?;
                        }
                    }
                    Command::Status => print_status(&session, &renderer, &mut out)?,
                    Command::Help => print_help(&renderer, &mut out)?,
                    Command::Quit => break,
                    Command::Unknown(name) => {
                        renderer.render_error(&format!("Unknown command {}. Type /help.", name), &mut out)?
                    }
                    Command::Question(question) => ask(&mut session, question, &renderer, &mut out).await?,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type /quit to exit.".yellow());
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = rl.save_history(path) {
            warn!(error = %e, "Could not save input history");
        }
    }

    println!("{}", "Goodbye!".bright_green());
    Ok(())
}
