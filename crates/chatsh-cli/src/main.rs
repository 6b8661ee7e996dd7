//! chatsh - chat with a language model that can run shell commands.

use anyhow::Result;
use chatsh_cli::{
    backend::CommandBackend, config, console::TerminalConsole, logging, repl, replay, system,
};
use chatsh_core::{
    ChatSession, InteractionLog, ProcessShell, RecordFormat, SessionOptions, Transcript,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Config;
use logging::{LogConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "chatsh")]
#[command(about = "Chat with a language model that proposes and runs shell commands")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (INFO level for chatsh targets)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace logging
    #[arg(long, global = true)]
    trace: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "log=debug" or "backend=trace").
    /// Can be specified multiple times. Targets are prefixed with "chatsh::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL", global = true)]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive session (the default)
    Chat {
        /// Model alias or full model id
        model: Option<String>,

        /// Initial message, sent without prompting
        message: Vec<String>,

        /// Override the log directory from config
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Override the record format (json_array or json_lines)
        #[arg(long, value_name = "FORMAT")]
        format: Option<RecordFormat>,
    },
    /// Print a recorded interaction log
    Replay {
        /// Interaction log file
        file: PathBuf,

        /// Play back from this interaction id
        #[arg(long, value_name = "ID", conflicts_with = "branch")]
        from: Option<u64>,

        /// Show the path from the root to this interaction id
        #[arg(long, value_name = "ID")]
        branch: Option<u64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    match cli.command {
        Some(Commands::Replay {
            file,
            from,
            branch,
            json,
        }) => run_replay(&file, from, branch, json),
        Some(Commands::Chat {
            model,
            message,
            log_dir,
            format,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(log_dir) = log_dir {
                config.log_dir = log_dir;
            }
            if let Some(format) = format {
                config.record_format = format;
            }
            run_chat(config, model, message).await
        }
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_chat(config, None, Vec::new()).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!(
        target: "chatsh::startup",
        "Loaded configuration (model: {}, log dir: {})",
        config.model,
        config.log_dir.display()
    );
    Ok(config)
}

async fn run_chat(config: Config, model: Option<String>, message: Vec<String>) -> Result<()> {
    let (program, args) = config.backend_argv()?;
    let backend = CommandBackend::new(program, args.to_vec());
    let shell = ProcessShell::new(config.shell.clone());

    let alias = model.unwrap_or_else(|| config.model.clone());
    let model = config.resolve_model(&alias);

    let mut system_prompt = config.base_system_prompt()?;
    if config.describe_system {
        system_prompt.push_str(&system::describe(&shell).await);
    }

    let log = InteractionLog::create(&config.log_dir, config.record_format)?;
    tracing::info!(
        target: "chatsh::startup",
        "Recording interactions to {}",
        log.path().display()
    );

    let options = SessionOptions {
        system_prompt,
        model: model.clone(),
        max_tokens: config.max_tokens,
        cacheable: config.cacheable_system_prompt,
    };
    let mut session = ChatSession::new(log, backend, shell, options);
    if config.transcript {
        match Transcript::create(&config.log_dir) {
            Ok(transcript) => session = session.with_transcript(transcript),
            Err(e) => tracing::warn!(target: "chatsh::startup", "Transcript disabled: {}", e),
        }
    }

    let mut console = TerminalConsole::stdio();
    console.print(&format!("Welcome to ChatSH. Model: {model}\n"));

    let initial = (!message.is_empty()).then(|| message.join(" "));
    repl::run(&mut session, &mut console, initial).await
}

fn run_replay(
    file: &std::path::Path,
    from: Option<u64>,
    branch: Option<u64>,
    json: bool,
) -> Result<()> {
    let log = InteractionLog::load_from_file(file)?;
    tracing::info!(
        target: "chatsh::startup",
        "Loaded {} interactions from {}",
        log.len(),
        file.display()
    );

    let selection = match (from, branch) {
        (Some(id), _) => replay::Selection::From(id),
        (None, Some(id)) => replay::Selection::Branch(id),
        (None, None) => replay::Selection::All,
    };
    let interactions = replay::select(&log, selection)?;

    if json {
        println!("{}", replay::render_json(&interactions)?);
    } else {
        print!("{}", replay::render_text(&interactions));
    }
    Ok(())
}
