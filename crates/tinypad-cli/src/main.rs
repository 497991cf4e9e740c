//! Tinypad CLI - a terminal notepad that writes with a local Ollama model.

use clap::{Parser, Subcommand};
use tinypad_ollama::{normalize_base_url, TinypadConfig};

mod commands;

use commands::SamplingArgs;

/// Tinypad - stream text from a local Ollama model
#[derive(Parser)]
#[command(name = "tinypad")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ollama base URL (default: $TINYPAD_OLLAMA_URL, $OLLAMA_HOST, or http://localhost:11434)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Model to generate with (default: first listed model)
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session (the default)
    Chat {
        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// List the models the daemon has installed
    Models,

    /// Check the daemon and start it if needed
    Status {
        /// Only probe; never start the daemon
        #[arg(long)]
        no_start: bool,
    },

    /// Generate once and print the reply
    Generate {
        /// Prompt text
        #[arg(required = true)]
        prompt: Vec<String>,

        #[command(flatten)]
        sampling: SamplingArgs,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging; stderr keeps generated text on stdout clean.
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut config = TinypadConfig::from_env();
    if let Some(url) = &cli.url {
        config.base_url = normalize_base_url(url);
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    let command = cli.command.unwrap_or(Commands::Chat {
        sampling: SamplingArgs::default(),
    });

    match command {
        Commands::Chat { sampling } => {
            runtime.block_on(commands::chat::run(&config, cli.model, sampling.into_input()))
        }
        Commands::Models => runtime.block_on(commands::models::run(&config)),
        Commands::Status { no_start } => runtime.block_on(commands::status::run(&config, no_start)),
        Commands::Generate { prompt, sampling } => runtime.block_on(commands::generate::run(
            &config,
            cli.model.as_deref(),
            &prompt.join(" "),
            &sampling.into_input(),
        )),
    }
}
