//! Export discovery: lists the `*.json` exports of an input directory,
//! selects them by date token and resolves each file's source from its name.

use super::json::parse_export;
use super::{ExportContents, InputFile};
use crate::error::{Error, InputError};
use crate::routing::RoutingTables;
use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which files in the input directory a run picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelection {
    /// Files whose name carries this `YYYYMMDD` token
    Date(String),
    /// Every export in the directory
    All,
}

impl FileSelection {
    /// Today's exports.
    pub fn today() -> Self {
        FileSelection::Date(Local::now().format("%Y%m%d").to_string())
    }

    /// Select a date given as `YYYYMMDD` or `YYYY-MM-DD`.
    pub fn date(token: &str) -> crate::Result<Self> {
        let parsed = NaiveDate::parse_from_str(token, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(token, "%Y-%m-%d"))
            .map_err(|e| Error::Config(format!("invalid date '{}': {}", token, e)))?;
        Ok(FileSelection::Date(parsed.format("%Y%m%d").to_string()))
    }

    /// Whether a file name is selected.
    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            FileSelection::Date(token) => file_name.contains(token.as_str()),
            FileSelection::All => true,
        }
    }
}

/// Lists export files from a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    selection: FileSelection,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, selection: FileSelection) -> Self {
        Self {
            dir: dir.into(),
            selection,
        }
    }

    /// Selected `*.json` files, sorted by name. Re-listing is always safe.
    pub fn list(&self, tables: &RoutingTables) -> Result<Vec<ExportFile>, InputError> {
        let unreadable = |e: std::io::Error| InputError::Unreadable {
            file_id: self.dir.display().to_string(),
            message: e.to_string(),
        };

        let mut files: Vec<ExportFile> = fs::read_dir(&self.dir)
            .map_err(unreadable)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
            .filter_map(|path| {
                let file_id = path.file_name()?.to_str()?.to_string();
                if !self.selection.matches(&file_id) {
                    debug!(file_id = %file_id, "File not selected");
                    return None;
                }
                let source = source_for_file(&file_id, tables);
                Some(ExportFile {
                    path,
                    file_id,
                    source,
                })
            })
            .collect();
        files.sort_by(|a, b| a.file_id.cmp(&b.file_id));

        info!(
            dir = %self.dir.display(),
            selection = ?self.selection,
            files = files.len(),
            "Input files discovered"
        );
        Ok(files)
    }
}

/// Source of a file: the longest registered source name followed by `_`
/// that prefixes the file name, else the name up to the first `_`.
pub fn source_for_file(file_name: &str, tables: &RoutingTables) -> String {
    let lower = file_name.to_lowercase();
    let registered = tables
        .source_names()
        .filter(|name| {
            lower
                .strip_prefix(*name)
                .map_or(false, |rest| rest.starts_with('_'))
        })
        .max_by_key(|name| name.len());
    if let Some(name) = registered {
        return name.to_string();
    }

    let stem = Path::new(&lower)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&lower)
        .to_string();
    match stem.split_once('_') {
        Some((head, _)) => head.to_string(),
        None => stem,
    }
}

/// An export file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub path: PathBuf,
    pub file_id: String,
    pub source: String,
}

impl InputFile for ExportFile {
    fn file_id(&self) -> &str {
        &self.file_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn read(&self) -> Result<ExportContents, InputError> {
        let bytes = fs::read(&self.path).map_err(|e| InputError::Unreadable {
            file_id: self.file_id.clone(),
            message: e.to_string(),
        })?;
        let batches = parse_export(&self.file_id, &self.source, &bytes)?;
        Ok(ExportContents {
            batches,
            checksum: crc32fast::hash(&bytes),
        })
    }
}
