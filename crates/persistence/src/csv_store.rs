use crate::record::{count_csv_rows, encode_row, GameRecord, HEADER, UTF8_BOM};
use crate::{PersistenceError, RecordSink, RecordStore};
use fs2::FileExt;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One lock per file, keyed by canonical path and shared by every store in
/// the process. Other processes are kept out by an OS file lock.
static PATH_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// `path` with its directory canonicalized, so `a/r.csv` and `a/b/../r.csv`
/// map to the same entry. The file itself need not exist.
fn lock_key(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (fs::canonicalize(dir), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut table = PATH_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    table.entry(lock_key(path)).or_default().clone()
}

/// Append-only CSV file of finished games.
///
/// A new file starts with a UTF-8 BOM and the header row; the header is
/// never written again. The emptiness check and the append of each record
/// happen under an exclusive lock on the file, with a single write.
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    path: PathBuf,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole file under a shared lock; `None` when it does not exist.
    fn read_locked(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        let lock = lock_for(&self.path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let mut bytes = Vec::new();
        let read = file.read_to_end(&mut bytes);
        FileExt::unlock(&file)?;
        read?;
        Ok(Some(bytes))
    }
}

impl RecordSink for CsvRecordStore {
    fn append(&self, record: &GameRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let lock = lock_for(&self.path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        FileExt::lock_exclusive(&file)?;
        let written = write_record(&mut file, &self.path, record);
        FileExt::unlock(&file)?;
        written?;
        debug!(path = %self.path.display(), player = %record.player, "record appended");
        Ok(())
    }
}

/// Caller holds the exclusive lock on `file`.
fn write_record(file: &mut File, path: &Path, record: &GameRecord) -> Result<(), PersistenceError> {
    let mut buf = Vec::new();
    if file.metadata()?.len() == 0 {
        buf.extend_from_slice(UTF8_BOM);
        buf.extend_from_slice(encode_row(&HEADER).as_bytes());
        info!(path = %path.display(), "created record file");
    }
    buf.extend_from_slice(encode_row(&record.fields()).as_bytes());
    file.write_all(&buf)?;
    file.flush()?;
    Ok(())
}

impl RecordStore for CsvRecordStore {
    /// Data rows only; the header is not counted.
    fn count(&self) -> Result<usize, PersistenceError> {
        let Some(bytes) = self.read_locked()? else {
            return Ok(0);
        };
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
        let text = std::str::from_utf8(body).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        Ok(count_csv_rows(text).saturating_sub(1))
    }

    /// The file as stored, byte for byte. Empty when nothing was recorded.
    fn export(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(self.read_locked()?.unwrap_or_default())
    }
}
