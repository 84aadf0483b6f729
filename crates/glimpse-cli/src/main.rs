use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use glimpse_contracts::chat::{help_lines, parse_intent, CommandKind, Intent};
use glimpse_contracts::conversation::{format_response_time, history_view};
use glimpse_contracts::models::{ModelRegistry, VISION};
use glimpse_contracts::params::{
    GenerationParameters, ParamsError, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use glimpse_engine::config::{AppConfig, DEFAULT_LOG_FILTER};
use glimpse_engine::error::{QueryError, Severity};
use glimpse_engine::VisionEngine;
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "glimpse", version, about = "Ask questions about an image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: upload images and ask questions.
    Chat(ChatArgs),
    /// Ask a single question about one image and exit.
    Ask(AskArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: u32,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl SessionArgs {
    fn params(&self) -> Result<GenerationParameters, ParamsError> {
        GenerationParameters::new(self.temperature, self.top_k)
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    question: String,
    #[arg(long)]
    json: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("glimpse error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let session = match &cli.command {
        Command::Chat(args) => &args.session,
        Command::Ask(args) => &args.session,
    };
    let config = AppConfig::load(session.env_file.as_deref());
    init_tracing(config.log_filter());
    if let Some(path) = config.env_file() {
        tracing::debug!(path = %path.display(), "loaded env file");
    }

    match cli.command {
        Command::Chat(args) => run_chat(&config, args),
        Command::Ask(args) => run_ask(&config, args),
    }
}

fn init_tracing(filter: &str) {
    let filter =
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn open_engine(config: &AppConfig, session: &SessionArgs) -> Result<Option<VisionEngine>> {
    let params = match session.params() {
        Ok(params) => params,
        Err(err) => {
            eprintln!("glimpse: {err}");
            return Ok(None);
        }
    };
    let engine = VisionEngine::new(
        config,
        session.model.as_deref(),
        params,
        session.events.clone(),
    )?;
    let selection = engine.model_selection();
    if selection.fell_back() {
        let reason = selection.fallback_reason.as_deref().unwrap_or_default();
        eprintln!("{reason} Using {}.", selection.model.name);
    }
    Ok(Some(engine))
}

fn run_chat(config: &AppConfig, args: ChatArgs) -> Result<i32> {
    let Some(mut engine) = open_engine(config, &args.session)? else {
        return Ok(EXIT_USAGE);
    };
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Some(path) = args.image.as_deref() {
        upload(&mut engine, path, &mut out)?;
    }
    run_chat_loop(&mut engine, &mut stdin.lock(), &mut out)?;
    Ok(EXIT_OK)
}

fn run_ask(config: &AppConfig, args: AskArgs) -> Result<i32> {
    let Some(mut engine) = open_engine(config, &args.session)? else {
        return Ok(EXIT_USAGE);
    };
    if let Err(err) = engine.upload_path(&args.image) {
        eprintln!("{err}");
        return Ok(EXIT_USAGE);
    }
    match engine.ask(&args.question) {
        Ok(entry) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("{}", entry.answer());
                eprintln!(
                    "Response time: {}",
                    format_response_time(entry.response_time_seconds())
                );
            }
            Ok(EXIT_OK)
        }
        Err(err) => {
            let mut stderr = io::stderr().lock();
            render_query_error(&err, &mut stderr)?;
            Ok(query_exit_code(&err))
        }
    }
}

/// User-correctable failures exit 2; remote failures exit 1.
fn query_exit_code(err: &QueryError) -> i32 {
    match err.severity() {
        Severity::Warning => EXIT_USAGE,
        Severity::Error | Severity::Fatal => EXIT_FAILURE,
    }
}

fn run_chat_loop(
    engine: &mut VisionEngine,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(
        out,
        "Glimpse chat started with {}. Type /help for commands.",
        engine.model().name
    )?;
    print_next_step(engine, out)?;

    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let command = match parse_intent(&line) {
            Intent::Noop => continue,
            Intent::Ask(question) => {
                ask(engine, &question, out)?;
                continue;
            }
            Intent::Unknown { command, .. } => {
                writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
                continue;
            }
            Intent::Command { kind, arg } => (kind, arg),
        };
        match command {
            (CommandKind::Quit, _) => break,
            (CommandKind::Help, _) => {
                writeln!(out, "Commands: {}", help_lines().join(" "))?;
                writeln!(out, "Anything else is a question about the current image.")?;
            }
            (CommandKind::Upload, None) => writeln!(out, "/upload requires a path")?,
            (CommandKind::Upload, Some(path)) => upload(engine, Path::new(&path), out)?,
            (CommandKind::SetTemperature, value) => {
                set_temperature(engine, value.as_deref(), out)?
            }
            (CommandKind::SetTopK, value) => set_top_k(engine, value.as_deref(), out)?,
            (CommandKind::SetModel, name) => set_model(engine, name.as_deref(), out)?,
            (CommandKind::Settings, _) => print_settings(engine, out)?,
            (CommandKind::ShowPrompt, _) => {
                writeln!(out, "System prompt:\n{}", engine.system_prompt())?
            }
            (CommandKind::History, _) => print_history(engine, out)?,
            (CommandKind::Clear, _) => {
                engine.clear();
                writeln!(out, "Conversation cleared.")?;
                print_next_step(engine, out)?;
            }
        }
    }
    writeln!(out, "Goodbye.")?;
    Ok(())
}

fn ask(engine: &mut VisionEngine, question: &str, out: &mut impl Write) -> Result<()> {
    // Busy line only when the model will actually be called.
    if engine.check_question(question).is_ok() {
        writeln!(out, "AI is thinking...")?;
        out.flush()?;
    }
    match engine.ask(question) {
        Ok(entry) => {
            writeln!(out, "{}", entry.answer())?;
            writeln!(
                out,
                "Response time: {}",
                format_response_time(entry.response_time_seconds())
            )?;
        }
        Err(err) => render_query_error(&err, out)?,
    }
    Ok(())
}

fn upload(engine: &mut VisionEngine, path: &Path, out: &mut impl Write) -> Result<()> {
    match engine.upload_path(path) {
        Ok(image) => {
            let info = image.info_line();
            writeln!(out, "Image uploaded successfully!")?;
            writeln!(out, "{info}")?;
        }
        Err(err) => writeln!(out, "{err}")?,
    }
    print_next_step(engine, out)
}

fn set_temperature(
    engine: &mut VisionEngine,
    value: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let Some(value) = value else {
        writeln!(out, "Temperature: {:.2}", engine.params().temperature())?;
        return Ok(());
    };
    let Ok(value) = value.parse::<f32>() else {
        writeln!(out, "Temperature must be a number, got '{value}'")?;
        return Ok(());
    };
    match engine.set_temperature(value) {
        Ok(params) => writeln!(out, "Temperature set to {:.2}", params.temperature())?,
        Err(err) => writeln!(out, "{err}")?,
    }
    Ok(())
}

fn set_top_k(
    engine: &mut VisionEngine,
    value: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let Some(value) = value else {
        writeln!(out, "Top-K: {}", engine.params().top_k())?;
        return Ok(());
    };
    let Ok(value) = value.parse::<u32>() else {
        writeln!(out, "Top-K must be a whole number, got '{value}'")?;
        return Ok(());
    };
    match engine.set_top_k(value) {
        Ok(params) => writeln!(out, "Top-K set to {}", params.top_k())?,
        Err(err) => writeln!(out, "{err}")?,
    }
    Ok(())
}

fn set_model(
    engine: &mut VisionEngine,
    name: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let Some(name) = name else {
        let available: Vec<String> = ModelRegistry::default()
            .by_capability(VISION)
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        writeln!(out, "Model: {}", engine.model().name)?;
        writeln!(out, "Available: {}", available.join(", "))?;
        return Ok(());
    };
    match engine.set_model(name) {
        Ok(selection) => {
            if let Some(reason) = selection.fallback_reason.as_deref() {
                writeln!(out, "{reason}")?;
            }
            writeln!(out, "Model set to {}", selection.model.name)?;
        }
        Err(err) => writeln!(out, "{err}")?,
    }
    Ok(())
}

fn print_settings(engine: &VisionEngine, out: &mut impl Write) -> Result<()> {
    let params = engine.params();
    let state = engine.session().state();
    writeln!(out, "Model: {} ({})", engine.model().name, engine.model().provider)?;
    writeln!(out, "Temperature: {:.2}", params.temperature())?;
    writeln!(out, "Top-K: {}", params.top_k())?;
    writeln!(out, "Max output tokens: {}", params.max_output_tokens())?;
    match state.current_image() {
        Some(image) => writeln!(out, "{}", image.info_line())?,
        None => writeln!(out, "Image: none")?,
    }
    writeln!(out, "Questions asked: {}", state.history().len())?;
    writeln!(out, "Session: {}", engine.session().id())?;
    Ok(())
}

fn print_history(engine: &VisionEngine, out: &mut impl Write) -> Result<()> {
    let items = history_view(engine.session().state().history());
    if items.is_empty() {
        writeln!(out, "No questions asked yet.")?;
        return Ok(());
    }
    writeln!(out, "Conversation History")?;
    for item in items {
        writeln!(out, "{}", item.heading())?;
        writeln!(out, "Q: {}", item.entry.question())?;
        writeln!(out, "A: {}", item.entry.answer())?;
        writeln!(out, "{}", item.response_time_caption())?;
    }
    Ok(())
}

fn print_next_step(engine: &VisionEngine, out: &mut impl Write) -> Result<()> {
    if let Some(hint) = engine.session().state().next_step_hint() {
        writeln!(out, "{hint}")?;
    }
    Ok(())
}

fn render_query_error(err: &QueryError, out: &mut impl Write) -> Result<()> {
    match err.severity() {
        Severity::Warning => writeln!(out, "warning: {err}")?,
        Severity::Error | Severity::Fatal => writeln!(out, "error: {err}")?,
    }
    if let Some(hint) = err.hint() {
        writeln!(out, "{hint}")?;
    }
    Ok(())
}
