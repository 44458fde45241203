//! Append-only ledger log.

use super::entries::{LedgerEntry, ProcessedEntry};
use super::replay::LedgerState;
use super::Ledger;
use crate::config::LedgerConfig;
use crate::LedgerError;
use chrono::Utc;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LEDGER_FILE: &str = "ledger.jsonl";
const LOCK_FILE: &str = "ledger.lock";

/// File-backed processed-file ledger (`<dir>/ledger.jsonl`).
///
/// Every append is flushed and fsynced before `mark_processed` returns, so a
/// crash never loses a completed file's entry. Opening holds `ledger.lock`
/// until the ledger is dropped; a second open fails with `Locked`.
pub struct FileLedger {
    path: PathBuf,
    sync: bool,
    writer: Mutex<BufWriter<File>>,
    state: RwLock<LedgerState>,
    _lock: LockGuard,
}

impl FileLedger {
    /// Open or create the ledger in the configured directory.
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        fs::create_dir_all(&config.dir).map_err(|e| {
            LedgerError::WriteFailed(format!("Failed to create ledger directory: {}", e))
        })?;

        let lock = LockGuard::acquire(config.dir.join(LOCK_FILE))?;
        let path = config.dir.join(LEDGER_FILE);
        let entries = read_entries(&path)?;
        let state = LedgerState::replay(entries);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to open ledger: {}", e)))?;

        info!(path = %path.display(), files = state.processed.len(), "Ledger opened");

        Ok(Self {
            path,
            sync: config.sync,
            writer: Mutex::new(BufWriter::new(file)),
            state: RwLock::new(state),
            _lock: lock,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and make it durable.
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let json = serde_json::to_string(entry)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to encode entry: {}", e)))?;

        let mut file = self.writer.lock();
        writeln!(file, "{}", json).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        file.flush()
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        if self.sync {
            file.get_ref()
                .sync_all()
                .map_err(|e| LedgerError::WriteFailed(format!("Failed to fsync: {}", e)))?;
        }
        Ok(())
    }

    /// Re-read every entry from disk.
    pub fn read_all_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        // Hold the writer so no append interleaves with the read
        let _writer = self.writer.lock();
        read_entries(&self.path)
    }
}

impl Ledger for FileLedger {
    fn is_processed(&self, file_id: &str) -> Result<bool, LedgerError> {
        Ok(self.state.read().processed.contains_key(file_id))
    }

    fn mark_processed(&self, entry: ProcessedEntry) -> Result<(), LedgerError> {
        let entry = LedgerEntry::Processed(entry);
        self.append(&entry)?;
        debug!(path = %self.path.display(), "Ledger entry appended");
        self.state.write().apply(entry);
        Ok(())
    }

    fn reset(&self, run_id: Uuid) -> Result<(), LedgerError> {
        let entry = LedgerEntry::Reset {
            run_id,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to encode entry: {}", e)))?;

        let mut writer = self.writer.lock();
        writer
            .flush()
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;

        // Write the single reset entry beside the log, then swap it in
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut fresh = BufWriter::new(
                File::create(&tmp).map_err(|e| LedgerError::WriteFailed(e.to_string()))?,
            );
            writeln!(fresh, "{}", json).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
            fresh
                .flush()
                .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
            fresh
                .get_ref()
                .sync_all()
                .map_err(|e| LedgerError::WriteFailed(format!("Failed to fsync: {}", e)))?;
        }
        fs::rename(&tmp, &self.path)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to replace ledger: {}", e)))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to reopen ledger: {}", e)))?;
        *writer = BufWriter::new(file);

        self.state.write().apply(entry);
        info!(run_id = %run_id, path = %self.path.display(), "Ledger reset");
        Ok(())
    }

    fn entries(&self) -> Result<Vec<ProcessedEntry>, LedgerError> {
        Ok(self.state.read().entries())
    }
}

/// Read entries in log order.
///
/// A trailing line without a newline that fails to parse is the remains of
/// an interrupted append: it is cut off with a warning. Any other bad line
/// is corruption.
fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LedgerError::ReadFailed(e.to_string())),
    };

    let mut entries = Vec::new();
    let mut good_len = 0usize;
    let mut offset = 0usize;
    let mut lines = content.split_inclusive('\n').enumerate().peekable();

    while let Some((line_num, line)) = lines.next() {
        offset += line.len();
        let text = line.trim();
        if text.is_empty() {
            good_len = offset;
            continue;
        }

        match serde_json::from_str::<LedgerEntry>(text) {
            Ok(entry) => {
                entries.push(entry);
                good_len = offset;
            }
            Err(e) if lines.peek().is_none() && !line.ends_with('\n') => {
                warn!(
                    path = %path.display(),
                    line = line_num + 1,
                    error = %e,
                    "Dropping torn trailing ledger entry"
                );
            }
            Err(e) => {
                return Err(LedgerError::Corrupted {
                    line: (line_num + 1) as u64,
                    message: format!("JSON parse error: {}", e),
                });
            }
        }
    }

    if good_len < content.len() {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        file.set_len(good_len as u64)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to truncate torn entry: {}", e)))?;
    }

    Ok(entries)
}

/// Exclusive advisory lock on `ledger.lock`.
///
/// The kernel drops the lock when its holder exits, so a crashed run leaves
/// at most a stale file behind, never a held lock. The file itself is kept.
struct LockGuard {
    path: PathBuf,
    file: File,
}

impl LockGuard {
    fn acquire(path: PathBuf) -> Result<Self, LedgerError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| LedgerError::WriteFailed(format!("Failed to open lock file: {}", e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Err(LedgerError::Locked(path.display().to_string()));
            }
            Err(e) => {
                return Err(LedgerError::WriteFailed(format!(
                    "Failed to lock {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        // Best effort: the pid only helps an operator find the holder
        let _ = file.set_len(0).and_then(|()| writeln!(file, "{}", std::process::id()));
        debug!(path = %path.display(), "Ledger lock acquired");
        Ok(Self { path, file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release ledger lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::OutcomeCounts;
    use tempfile::TempDir;

    fn create_test_config() -> (LedgerConfig, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            dir: temp_dir.path().to_path_buf(),
            sync: true,
        };
        (config, temp_dir)
    }

    fn entry(file_id: &str) -> ProcessedEntry {
        ProcessedEntry {
            file_id: file_id.into(),
            run_id: Uuid::new_v4(),
            source: "tmdb".into(),
            checksum: 42,
            outcome: OutcomeCounts {
                records_routed: 2,
                rows_created: 2,
                ..OutcomeCounts::default()
            },
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_ledger_persists_across_reopen() {
        let (config, _temp_dir) = create_test_config();
        {
            let ledger = FileLedger::open(&config).unwrap();
            ledger.mark_processed(entry("tmdb_20240115.json")).unwrap();
            assert!(ledger.is_processed("tmdb_20240115.json").unwrap());
        }

        let ledger = FileLedger::open(&config).unwrap();
        assert!(ledger.is_processed("tmdb_20240115.json").unwrap());
        assert!(!ledger.is_processed("imdb_20240115.json").unwrap());
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_truncates_to_single_entry() {
        let (config, _temp_dir) = create_test_config();
        let ledger = FileLedger::open(&config).unwrap();
        ledger.mark_processed(entry("a.json")).unwrap();
        ledger.mark_processed(entry("b.json")).unwrap();

        ledger.reset(Uuid::new_v4()).unwrap();

        assert!(!ledger.is_processed("a.json").unwrap());
        let on_disk = ledger.read_all_entries().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert!(on_disk[0].is_reset());

        // Appends after a reset land in the new log
        ledger.mark_processed(entry("c.json")).unwrap();
        drop(ledger);
        let ledger = FileLedger::open(&config).unwrap();
        assert_eq!(ledger.entries().unwrap().len(), 1);
        assert!(ledger.is_processed("c.json").unwrap());
    }

    #[test]
    fn test_second_open_is_locked() {
        let (config, _temp_dir) = create_test_config();
        let first = FileLedger::open(&config).unwrap();
        let second = FileLedger::open(&config);
        assert!(matches!(second, Err(LedgerError::Locked(_))));

        drop(first);
        assert!(FileLedger::open(&config).is_ok());
    }

    #[test]
    fn test_lock_file_left_by_crashed_run_is_taken_over() {
        let (config, temp_dir) = create_test_config();
        {
            let ledger = FileLedger::open(&config).unwrap();
            ledger.mark_processed(entry("a.json")).unwrap();
        }
        // A killed run leaves its lock file, holding a pid that is gone
        fs::write(temp_dir.path().join(LOCK_FILE), "4194304\n").unwrap();

        let ledger = FileLedger::open(&config).unwrap();
        assert!(ledger.is_processed("a.json").unwrap());
        let holder = fs::read_to_string(temp_dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(holder.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_torn_trailing_line_is_dropped() {
        let (config, temp_dir) = create_test_config();
        {
            let ledger = FileLedger::open(&config).unwrap();
            ledger.mark_processed(entry("a.json")).unwrap();
        }
        let path = temp_dir.path().join(LEDGER_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"type\":\"Processed\",\"file_id\":\"b.js").unwrap();
        drop(file);

        let ledger = FileLedger::open(&config).unwrap();
        assert!(ledger.is_processed("a.json").unwrap());
        assert!(!ledger.is_processed("b.json").unwrap());

        ledger.mark_processed(entry("c.json")).unwrap();
        assert_eq!(ledger.read_all_entries().unwrap().len(), 2);
    }

    #[test]
    fn test_corruption_mid_log_is_an_error() {
        let (config, temp_dir) = create_test_config();
        let path = temp_dir.path().join(LEDGER_FILE);
        let good = serde_json::to_string(&LedgerEntry::Processed(entry("a.json"))).unwrap();
        fs::write(&path, format!("not json\n{}\n", good)).unwrap();

        let result = FileLedger::open(&config);
        assert!(matches!(
            result,
            Err(LedgerError::Corrupted { line: 1, .. })
        ));
        // The failed open released its lock
        fs::remove_file(&path).unwrap();
        assert!(FileLedger::open(&config).is_ok());
    }
}
