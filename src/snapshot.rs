//! Snapshot Writer.
//!
//! Writes the document to a temporary sibling file, fsyncs it, then
//! atomically renames it over the canonical file. Generalizes the
//! teacher's compaction rename (`engine/kvs.rs::SharedKvStore::compact`,
//! which writes a new generation file then `fs::rename`s it into place)
//! from "rename a compacted log generation into place" to "rename a
//! freshly serialized snapshot into place."

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

use crate::codec;
use crate::codec::EncryptionKey;
use crate::error::Result;
use crate::lock::FileLock;

pub fn tmp_path(canonical: &FsPath) -> PathBuf {
    let mut os = canonical.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Serializes `doc`, writes it to the `.tmp` sibling, fsyncs it, renames it
/// over the canonical file, and fsyncs the containing directory. Acquires
/// the advisory lock for the duration of the write (spec.md §4.5).
///
/// On any failure after the temporary write but before the rename
/// completes, the temporary file is left in place as a recovery candidate
/// for the next open (spec.md §4.5, §4.9 step 1).
pub fn write(
    canonical: &FsPath,
    doc: &serde_json::Value,
    indented: bool,
    key: Option<&EncryptionKey>,
) -> Result<()> {
    let _lock = FileLock::try_acquire_for_snapshot(canonical)?;
    write_locked(canonical, doc, indented, key)
}

/// Same as `write`, but assumes the caller already holds the engine's
/// lifetime lock (the common case: the engine acquires its lock once at
/// open and holds it for the life of the instance, per spec.md §4.9 step
/// 5, so snapshot writes don't need to re-acquire it).
pub fn write_locked(
    canonical: &FsPath,
    doc: &serde_json::Value,
    indented: bool,
    key: Option<&EncryptionKey>,
) -> Result<()> {
    let plaintext = codec::serialize(doc, indented)?;
    let bytes = match key {
        Some(k) => codec::encrypt(&plaintext, k)?,
        None => plaintext,
    };

    let tmp = tmp_path(canonical);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    rename_over(&tmp, canonical)?;
    fsync_parent_dir(canonical)?;
    Ok(())
}

/// Atomic on POSIX (`rename(2)` atomically replaces an existing
/// destination). On platforms where rename-over-existing isn't atomic, this
/// falls back to delete-then-rename with a best-effort rollback: if the
/// rename after removing the destination fails, the caller is left with a
/// missing canonical file and an intact temp file, which recovery treats as
/// a completed-but-not-yet-renamed snapshot (spec.md §4.9 step 1).
fn rename_over(tmp: &FsPath, canonical: &FsPath) -> Result<()> {
    match fs::rename(tmp, canonical) {
        Ok(()) => Ok(()),
        Err(_e) if cfg!(not(unix)) && canonical.exists() => {
            let backup = backup_path(canonical);
            fs::rename(canonical, &backup)?;
            match fs::rename(tmp, canonical) {
                Ok(()) => {
                    let _ = fs::remove_file(&backup);
                    Ok(())
                }
                Err(rename_err) => {
                    // best-effort rollback
                    let _ = fs::rename(&backup, canonical);
                    Err(rename_err.into())
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn backup_path(canonical: &FsPath) -> PathBuf {
    let mut os = canonical.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}

fn fsync_parent_dir(canonical: &FsPath) -> Result<()> {
    if let Some(parent) = canonical.parent() {
        if !parent.as_os_str().is_empty() {
            // Directory fsync is POSIX-only and best-effort; opening a
            // directory for read fails on some platforms/filesystems, in
            // which case there's nothing useful to sync.
            if let Ok(dir) = OpenOptions::new().read(true).open(parent) {
                let _ = dir.sync_all();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back_compact() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("store.json");
        let doc = json!({"a": 1});
        write(&canonical, &doc, false, None).unwrap();
        let bytes = fs::read(&canonical).unwrap();
        assert_eq!(codec::deserialize(&bytes).unwrap(), doc);
        assert!(!tmp_path(&canonical).exists());
    }

    #[test]
    fn write_with_key_produces_envelope() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("store.json");
        let key = EncryptionKey::new(&[3u8; 32]).unwrap();
        let doc = json!({"secret": "my secret"});
        write(&canonical, &doc, false, Some(&key)).unwrap();
        let bytes = fs::read(&canonical).unwrap();
        assert!(codec::looks_like_envelope(&bytes));
        assert!(!String::from_utf8_lossy(&bytes).contains("my secret"));
    }
}
