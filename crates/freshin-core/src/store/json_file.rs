use super::{DomainRows, MemoryStore, TargetStore};
use crate::error::TargetStoreError;
use crate::model::{FieldValues, TargetDomain, TargetRow};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed target store: `<dir>/<domain>.json` per domain.
///
/// Rows are loaded on open and served from memory. `flush` rewrites every
/// domain touched since the last flush through a temp file and a rename, so
/// a crash leaves either the old or the new document.
pub struct JsonFileStore {
    dir: PathBuf,
    rows: MemoryStore,
    dirty: Mutex<BTreeSet<TargetDomain>>,
}

impl JsonFileStore {
    /// Open the store directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, TargetStoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            TargetStoreError::OpenFailed(format!("{}: {}", dir.display(), e))
        })?;

        let mut loaded = BTreeMap::new();
        for domain in TargetDomain::ALL {
            let path = domain_path(&dir, domain);
            if !path.exists() {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| {
                TargetStoreError::OpenFailed(format!("{}: {}", path.display(), e))
            })?;
            let document: BTreeMap<String, FieldValues> = serde_json::from_str(&content)
                .map_err(|e| TargetStoreError::OpenFailed(format!("{}: {}", path.display(), e)))?;
            let rows: DomainRows = document
                .into_iter()
                .map(|(key, fields)| (key, TargetRow::new(fields)))
                .collect();
            debug!(domain = %domain, rows = rows.len(), "Loaded domain rows");
            loaded.insert(domain, rows);
        }

        info!(path = %dir.display(), domains = loaded.len(), "Target store opened");

        Ok(Self {
            dir,
            rows: MemoryStore::from_rows(loaded),
            dirty: Mutex::new(BTreeSet::new()),
        })
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot of a row.
    pub fn row(&self, domain: TargetDomain, key: &str) -> Option<TargetRow> {
        self.rows.row(domain, key)
    }

    fn write_domain(&self, domain: TargetDomain, rows: &DomainRows) -> std::io::Result<()> {
        let path = domain_path(&self.dir, domain);
        let tmp = path.with_extension("json.tmp");
        let document: BTreeMap<&String, &FieldValues> =
            rows.iter().map(|(key, row)| (key, &row.fields)).collect();

        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)
    }
}

impl TargetStore for JsonFileStore {
    fn get_row(&self, domain: TargetDomain, key: &str) -> Result<Option<TargetRow>, TargetStoreError> {
        self.rows.get_row(domain, key)
    }

    fn upsert_row(
        &self,
        domain: TargetDomain,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), TargetStoreError> {
        self.rows.upsert_row(domain, key, values)?;
        self.dirty.lock().insert(domain);
        Ok(())
    }

    fn flush(&self) -> Result<(), TargetStoreError> {
        let mut dirty = self.dirty.lock();
        if dirty.is_empty() {
            return Ok(());
        }
        let snapshot = self.rows.snapshot();
        for domain in dirty.iter() {
            let empty = DomainRows::new();
            let rows = snapshot.get(domain).unwrap_or(&empty);
            self.write_domain(*domain, rows)
                .map_err(|e| TargetStoreError::FlushFailed(format!("{}: {}", domain, e)))?;
            debug!(domain = %domain, rows = rows.len(), "Flushed domain rows");
        }
        dirty.clear();
        Ok(())
    }
}

fn domain_path(dir: &Path, domain: TargetDomain) -> PathBuf {
    dir.join(format!("{}.json", domain.as_str()))
}
