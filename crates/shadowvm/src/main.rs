//! ShadowVM - Shadow object server for remote program analysis
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default)
//! shadowvm
//! shadowvm --config configs/shadowvm.toml
//!
//! # Send a burst of demo events to a running server
//! shadowvm demo --events 10000
//! ```

mod cmd;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shadowvm_config::{Config, LogConfig, LogFormat, LogOutput};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// ShadowVM - Shadow object server for remote program analysis
#[derive(Parser, Debug)]
#[command(name = "shadowvm")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the shadow server
    Serve(cmd::serve::ServeArgs),

    /// Connect as a client and send demo events
    Demo(cmd::demo::DemoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.log, cli.log_level.as_deref())?;

    match cli.command {
        Some(Command::Serve(args)) => cmd::serve::run(args, config).await,
        Some(Command::Demo(args)) => cmd::demo::run(args, config).await,
        // No subcommand = run server
        None => cmd::serve::run(cmd::serve::ServeArgs::default(), config).await,
    }
}

/// Load the given config file, or a default path if present, or defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        // Explicit path - must exist
        return Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    for candidate in ["configs/shadowvm.toml", "shadowvm.toml"] {
        let path = Path::new(candidate);
        if path.exists() {
            return Config::from_file(path)
                .with_context(|| format!("failed to load configuration from {candidate}"));
        }
    }

    Ok(Config::default())
}

/// Initialize the tracing subscriber: CLI level > config level
fn init_logging(log: &LogConfig, cli_level: Option<&str>) -> Result<()> {
    let level = cli_level.unwrap_or(log.level.as_str());
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let (writer, ansi) = match &log.output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path}"))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    match log.format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_ansi(ansi).with_writer(writer))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(writer))
            .with(filter)
            .init(),
    }

    Ok(())
}
