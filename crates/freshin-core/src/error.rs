//! Error types for freshin core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Classification, mapping and target-store errors are recovered by the
//! routing coordinator and counted; ledger errors abort the run.

use thiserror::Error;

/// Result type alias for freshin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for freshin.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No domain rule matched a record
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    /// Record could not be mapped to a usable canonical record
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Target store read or write failed
    #[error("Target store error: {0}")]
    TargetStore(#[from] TargetStoreError),

    /// Processed-file ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Input file could not be read or parsed
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Type classifier errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    /// Neither a fixed domain, a type hint nor any indicator field matched
    #[error("no domain matched source '{source_name}' (hint: {hint:?}, {field_count} fields)")]
    Unclassified {
        source_name: String,
        hint: Option<String>,
        field_count: usize,
    },
}

/// Field mapper errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// Key field absent and no other canonical field could be mapped
    #[error("record from '{source_name}' has no usable {domain} fields")]
    Incomplete { source_name: String, domain: String },
}

/// Target store errors.
#[derive(Error, Debug)]
pub enum TargetStoreError {
    /// Writing a row failed
    #[error("Write failed for {domain}/{key}: {message}")]
    WriteFailed {
        domain: String,
        key: String,
        message: String,
    },

    /// Persisting buffered writes failed
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    /// Store could not be opened
    #[error("Open failed: {0}")]
    OpenFailed(String),
}

/// Processed-file ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger corrupted
    #[error("Ledger corrupted at line {line}: {message}")]
    Corrupted { line: u64, message: String },

    /// Entry write failed
    #[error("Entry write failed: {0}")]
    WriteFailed(String),

    /// Reading the ledger failed
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Another run holds the ledger
    #[error("Ledger is locked by another run: {0}")]
    Locked(String),
}

/// Input file errors.
#[derive(Error, Debug)]
pub enum InputError {
    /// File could not be read
    #[error("Cannot read {file_id}: {message}")]
    Unreadable { file_id: String, message: String },

    /// File content is not a recognised export layout
    #[error("Malformed export {file_id}: {message}")]
    Malformed { file_id: String, message: String },
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
