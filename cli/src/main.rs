//! # cardhost-cli
//!
//! Command-line tool for compiling and validating card realms.
//!
//! ## Commands
//!
//! - `cards compile [urls...]` - Compile cards and write their modules
//! - `cards validate [urls...]` - Compile cards and report failures
//! - `cards list` - List the cards found in the configured realms
//! - `cards config validate` - Validate cards.toml
//!
//! See `cards --help` for the full command reference.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::process;

mod commands;
mod config;
mod logging;
mod realm;
mod ui;

#[derive(Parser)]
#[command(name = "cards")]
#[command(about = "Cardhost CLI - Compile and validate card realms", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to cards.toml configuration file
    #[arg(short, long, global = true, default_value = "cards.toml")]
    config: String,

    /// Output as JSON (machine-readable format)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Generate shell completions
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile cards and write every defined module to the output directory
    Compile {
        /// Card URLs to compile (compiles every realm card if not specified)
        urls: Vec<String>,
    },

    /// Compile cards and report the ones that fail
    Validate {
        /// Card URLs to check (checks every realm card if not specified)
        urls: Vec<String>,
    },

    /// List cards found in the configured realms
    List,

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate the configuration file
    Validate,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "cards", &mut io::stdout());
        return;
    }

    let logging = logging::LoggingConfig {
        verbose: cli.verbose,
        json_logs: cli.json,
    };
    if let Err(e) = logging::init(logging) {
        eprintln!("{} {}", "Warning:".yellow().bold(), e);
    }

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let validation_only = e
            .downcast_ref::<commands::CompileFailures>()
            .is_some_and(|failures| failures.validation_only);
        process::exit(if validation_only { 2 } else { 1 });
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Compile { urls } => commands::compile::compile(&cli.config, &urls, cli.json),
        Commands::Validate { urls } => commands::validate::validate(&cli.config, &urls, cli.json),
        Commands::List => commands::list::list(&cli.config, cli.json),
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Validate => commands::config::validate(&cli.config),
        },
    }
}
