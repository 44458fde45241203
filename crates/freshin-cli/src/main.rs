//! Freshin CLI - routes daily data exports into canonical target domains.

use anyhow::Result;
use clap::{Parser, Subcommand};
use freshin_core::config::LogFormat;
use freshin_core::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, invalid routing tables)
    ConfigError = 1,
    /// Input directory or file error
    InputError = 2,
    /// Target store error
    StoreError = 3,
    /// Processed-file ledger error
    LedgerError = 5,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code, by type where possible and by
    /// message otherwise.
    fn from_error(error: &anyhow::Error) -> Self {
        if let Some(err) = error.downcast_ref::<freshin_core::Error>() {
            return match err {
                freshin_core::Error::Config(_) => ExitCode::ConfigError,
                freshin_core::Error::Input(_) => ExitCode::InputError,
                freshin_core::Error::TargetStore(_) => ExitCode::StoreError,
                freshin_core::Error::Ledger(_) => ExitCode::LedgerError,
                _ => ExitCode::RuntimeError,
            };
        }
        if error.downcast_ref::<freshin_core::LedgerError>().is_some() {
            return ExitCode::LedgerError;
        }
        if error.downcast_ref::<freshin_core::TargetStoreError>().is_some() {
            return ExitCode::StoreError;
        }
        if error.downcast_ref::<freshin_core::InputError>().is_some() {
            return ExitCode::InputError;
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;

/// Config file looked up in the working directory when `-c` is not given.
const DEFAULT_CONFIG: &str = "freshin.toml";

#[derive(Parser)]
#[command(name = "freshin")]
#[command(about = "Classification-and-merge router for daily data exports", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Route export files into the target store
    Route(commands::route::RouteArgs),

    /// Inspect or clear the processed-file ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Validate configuration and routing tables
    Validate,
}

#[derive(Subcommand)]
enum LedgerAction {
    /// List processed files
    List,
    /// Forget every processed file
    Reset,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Log settings come from the config when it parses; otherwise defaults
    let monitoring = config_path(&cli.config)
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_str()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Configure log format based on config
    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    match execute_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Route(args) => {
            let interrupted = commands::route::run(config, args).await?;
            if interrupted {
                return Ok(ExitCode::SignalInterrupt);
            }
        }

        Commands::Ledger { action } => match action {
            LedgerAction::List => commands::ledger::list(&config)?,
            LedgerAction::Reset => commands::ledger::reset(&config)?,
        },

        Commands::Validate => {
            commands::validate(&config)?;
            println!("Configuration is valid");
        }
    }

    Ok(ExitCode::Success)
}

/// Explicit `-c` path, else `freshin.toml` when it exists.
fn config_path(path: &Option<PathBuf>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.is_file()),
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match config_path(path) {
        Some(path) => Ok(Config::from_file(Path::new(&path))?),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
