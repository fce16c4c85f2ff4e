//! fnrouter CLI: the main entry point.
//!
//! Commands:
//! - `run`          : Route one request through the configured capabilities
//! - `capabilities` : List registered capabilities
//! - `prompt`       : Print the system prompt the router sends
//! - `onboard`      : Write a default config
//! - `doctor`       : Diagnose config and provider health
//! - `config`       : Show, locate, or validate the config

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "fnrouter",
    about = "fnrouter — drive a model through one JSON action at a time",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a request, one action per model turn
    Run(commands::run::RunArgs),

    /// List the capabilities the router can call
    Capabilities,

    /// Print the system prompt
    Prompt {
        /// Workflow rules file appended to the prompt
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose configuration and provider health
    Doctor,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose. Logs go to stderr, stdout carries step output
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Capabilities => commands::capabilities::run().await?,
        Commands::Prompt { rules } => commands::prompt::run(rules).await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
