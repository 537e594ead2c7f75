//! Write-rename, claim-move and directory scan primitives

use crate::store::error::StoreError;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TEMP_PREFIX: &str = ".tmp-";

/// Atomically write `value` as pretty JSON to `path`.
///
/// The bytes are written to a sibling temp file (`.tmp-<pid>-<nanos>-<rand>`),
/// fsynced, then renamed over the target. The rename is the commit point: a
/// concurrent reader sees either the old complete record or the new one,
/// never a torn write. The parent directory is fsynced best-effort so the
/// rename itself survives a crash.
///
/// # Errors
///
/// Returns `StoreError::Io` on any step; the temp file is removed on failure.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::io(path, std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"))
    })?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let tmp = dir.join(format!(
        "{TEMP_PREFIX}{}-{}-{:04x}",
        std::process::id(),
        nanos,
        rand::thread_rng().r#gen::<u16>()
    ));

    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;

    let result = (|| -> Result<(), StoreError> {
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
        return result;
    }

    // Durability of the rename itself; the commit already happened.
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }

    Ok(())
}

/// Read and decode a JSON record.
///
/// Missing files map to `StoreError::NotFound`; present-but-undecodable files
/// map to `StoreError::Corrupt` (the poison class).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::NotFound { path: path.to_path_buf() });
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Claim a work item by renaming `src` to `dst`.
///
/// Returns `Ok(false)` iff `src` vanished, meaning another claimant won the
/// race. Any other failure is `StoreError::Io`.
pub fn claim_move(src: &Path, dst: &Path) -> Result<bool, StoreError> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(src, e)),
    }
}

/// List file names in `dir` with the given suffix, ascending lexical order.
///
/// A missing directory is an empty listing. Temp files are excluded. Callers
/// rely on names sorting in creation order, which holds because message ids
/// are ULIDs.
pub fn list_sorted(dir: &Path, suffix: &str) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(suffix) && !name.starts_with(TEMP_PREFIX))
        .collect();
    names.sort();
    Ok(names)
}

/// Recursive mkdir, idempotent.
pub fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))
}

/// Remove a file, silent on missing.
pub fn unlink(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Create an empty marker file, idempotent.
pub fn write_marker(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| StoreError::io(path, e))
}

/// Delete temp files left behind by crashed writers.
///
/// Only names with the store's temp prefix and a modification time older than
/// `max_age` are touched; a writer mid-commit is never raced.
pub fn remove_stale_temps(dir: &Path, max_age: Duration) -> Result<usize, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(TEMP_PREFIX) {
            continue;
        }
        let old_enough = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .is_some_and(|age| age >= max_age);
        if old_enough && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}
