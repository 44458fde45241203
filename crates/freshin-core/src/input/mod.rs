//! Input files: the exports a run routes.

mod directory;
pub mod json;

pub use directory::{source_for_file, DirectorySource, ExportFile, FileSelection};

use crate::error::InputError;
use crate::model::{FieldValues, RawRecord};

/// Records sharing one source and type hint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    /// Source the batch was produced by
    pub source: String,
    /// Source-internal type label (`type` or `endpoint` of the envelope)
    pub type_hint: Option<String>,
    /// Flat records in file order
    pub records: Vec<FieldValues>,
}

impl RawBatch {
    /// Records tagged with the batch's source and hint.
    pub fn raw_records(&self) -> impl Iterator<Item = RawRecord> + '_ {
        self.records.iter().map(move |fields| RawRecord {
            source: self.source.clone(),
            type_hint: self.type_hint.clone(),
            fields: fields.clone(),
        })
    }
}

/// Contents of one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportContents {
    pub batches: Vec<RawBatch>,
    /// CRC32 of the file bytes
    pub checksum: u32,
}

/// One input file as seen by the routing coordinator.
pub trait InputFile {
    /// Stable identifier, recorded in the ledger.
    fn file_id(&self) -> &str;

    /// Source the file belongs to.
    fn source(&self) -> &str;

    /// Read and parse the file.
    fn read(&self) -> Result<ExportContents, InputError>;
}

/// In-memory input file.
#[derive(Debug, Clone)]
pub struct StaticFile {
    file_id: String,
    source: String,
    batches: Vec<RawBatch>,
}

impl StaticFile {
    /// A file holding the given batches.
    pub fn new(file_id: impl Into<String>, source: impl Into<String>, batches: Vec<RawBatch>) -> Self {
        Self {
            file_id: file_id.into(),
            source: source.into(),
            batches,
        }
    }

    /// A file holding one batch of records under `source`.
    pub fn records(
        file_id: impl Into<String>,
        source: impl Into<String>,
        type_hint: Option<&str>,
        records: Vec<FieldValues>,
    ) -> Self {
        let source = source.into();
        let batch = RawBatch {
            source: source.clone(),
            type_hint: type_hint.map(str::to_string),
            records,
        };
        Self::new(file_id, source, vec![batch])
    }
}

impl InputFile for StaticFile {
    fn file_id(&self) -> &str {
        &self.file_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn read(&self) -> Result<ExportContents, InputError> {
        let mut hasher = crc32fast::Hasher::new();
        for batch in &self.batches {
            for record in &batch.records {
                let bytes = serde_json::to_vec(record).map_err(|e| InputError::Malformed {
                    file_id: self.file_id.clone(),
                    message: e.to_string(),
                })?;
                hasher.update(&bytes);
            }
        }
        Ok(ExportContents {
            batches: self.batches.clone(),
            checksum: hasher.finalize(),
        })
    }
}
