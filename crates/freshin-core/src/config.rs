//! Configuration structures for freshin.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.
//! Routing tables live in their own file, see [`crate::routing::RoutingTables`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Input directory configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Target store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Processed-file ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Run report configuration
    #[serde(default)]
    pub report: ReportConfig,

    /// Routing tables configuration
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Where daily exports are read from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Directory holding the export files
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
        }
    }
}

/// Target store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding one JSON document per domain
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

/// Processed-file ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Directory for the ledger log and its lock file
    #[serde(default = "default_ledger_dir")]
    pub dir: PathBuf,

    /// fsync after every appended entry
    #[serde(default = "default_sync")]
    pub sync: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: default_ledger_dir(),
            sync: default_sync(),
        }
    }
}

/// Run report output.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory run reports are written to; none disables the file
    pub dir: Option<PathBuf>,
}

/// Routing tables location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// TOML tables file; the built-in tables are used when unset
    pub tables_path: Option<PathBuf>,
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_input_dir() -> PathBuf {
    PathBuf::from("./data/raw")
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("./data/target")
}
fn default_ledger_dir() -> PathBuf {
    PathBuf::from("./data/ledger")
}
fn default_sync() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.input.dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("Input directory is required".into()));
        }

        if self.store.dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("Store directory is required".into()));
        }

        if self.ledger.dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("Ledger directory is required".into()));
        }

        if self.ledger.dir == self.store.dir {
            return Err(crate::Error::Config(
                "Ledger and store must use different directories".into(),
            ));
        }

        if let Some(path) = &self.routing.tables_path {
            if !path.is_file() {
                return Err(crate::Error::Config(format!(
                    "Routing tables not found: {}",
                    path.display()
                )));
            }
        }

        if !self.ledger.sync {
            tracing::warn!("Ledger fsync disabled; a crash may lose processed-file entries");
        }

        Ok(())
    }
}
