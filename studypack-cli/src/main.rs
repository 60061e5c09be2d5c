//! StudyPack CLI
//!
//! Generates study packs from notes on the command line and runs the
//! StudyPack HTTP API.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use studypack_core::{Config, GenerationMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// StudyPack - summaries, key points and flashcards from study notes
#[derive(Parser)]
#[command(name = "studypack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(short, long, global = true, env = "STUDYPACK_MODEL")]
    model: Option<String>,

    /// Server port (overrides config)
    #[arg(long, global = true, env = "STUDYPACK_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error); defaults to logging.level
    #[arg(long, global = true, env = "STUDYPACK_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a study pack from notes
    Generate {
        /// The notes (or read from --file or stdin if not provided)
        content: Option<String>,

        /// Read notes from a file
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Generation mode (simple, exam, detailed)
        #[arg(long, default_value = "simple")]
        mode: GenerationMode,

        /// User id to charge the request to
        #[arg(long)]
        user: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show today's usage
    Usage {
        /// User id to look up
        #[arg(long)]
        user: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Preview how notes would be split into chunks
    Chunk {
        /// Read notes from a file (stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum characters per chunk (overrides config)
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Run the HTTP API
    Serve,

    /// Check a running server
    Status,

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Initialize default configuration
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Command-line flags win over the config file and its env overrides
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.gemini.model = model.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(path) = &cli.config {
        Config::load_from_file(path)?
    } else {
        Config::load()?
    };

    cli.apply_overrides(&mut config);
    init_logging(&config.logging.level);

    Config::ensure_dirs()?;

    match cli.command {
        Commands::Generate {
            content,
            file,
            mode,
            user,
            json,
        } => commands::generate::run(config, content, file, mode, user, json).await,
        Commands::Usage { user, json } => commands::usage::run(config, user, json).await,
        Commands::Chunk { file, max_chars } => commands::chunk::run(config, file, max_chars),
        Commands::Serve => commands::serve::run(config).await,
        Commands::Status => commands::status::run(config).await,
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(config),
            ConfigCommands::Init { force } => commands::config::init(force),
        },
    }
}
