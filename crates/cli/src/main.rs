//! aiservices CLI — the main entry point.
//!
//! Commands:
//! - `config`  — Create, show and check the configuration file
//! - `render`  — Assemble a request and print it without calling a model
//! - `replay`  — Run an invocation against a scripted model

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "aiservices",
    about = "aiservices — invoke language models through tools, memory and moderation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to ~/.aiservices/config.toml)
    #[arg(long, global = true, env = "AISERVICES_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the messages a request would send, as JSON
    Render(commands::render::RenderArgs),

    /// Invoke against model responses read from a script file
    Replay(commands::replay::ReplayArgs),
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Validate the configuration
    Check,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let logs = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json_logs {
        logs.json().init();
    } else {
        logs.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Check => commands::config_cmd::check(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
        },
        Commands::Render(args) => commands::render::run(config_path, args).await?,
        Commands::Replay(args) => commands::replay::run(config_path, args).await?,
    }

    Ok(())
}
