//! Freshin Core - classification-and-merge routing for daily data exports
//!
//! This library routes records from heterogeneous source exports into six
//! canonical target domains with:
//!
//! - Deterministic domain classification from fixed domains, type hints and indicator fields
//! - Per-source alias tables with value transforms
//! - Per-field MERGE / OVERWRITE policies with priority ordering across sources
//! - A crash-safe processed-file ledger so reruns are idempotent

pub mod config;
pub mod error;
pub mod input;
pub mod ledger;
pub mod model;
pub mod report;
pub mod routing;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{ClassificationError, InputError, LedgerError, MappingError, TargetStoreError};
pub use error::{Error, Result};
