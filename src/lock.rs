//! Advisory cross-process file lock.
//!
//! Grounded on the `fs2::FileExt` advisory-locking pattern used in
//! `prataprc-rdms/src/robt.rs` (`fd.try_lock_exclusive()`), generalized
//! into a retrying acquire with the staleness horizon spec.md §4.5
//! requires: up to 3 retries with exponential backoff, stale after 7s.

use std::fs::{File, OpenOptions};
use std::path::{Path as FsPath, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, InitError};

const MAX_RETRIES: u32 = 3;
const STALE_AFTER: Duration = Duration::from_secs(7);

/// An advisory lock file held alongside the canonical file, for the life of
/// the engine instance (spec.md §4.9 step 5) and for each snapshot write
/// (spec.md §4.5).
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    pub fn sibling_path(canonical: &FsPath) -> PathBuf {
        let mut os = canonical.as_os_str().to_owned();
        os.push(".lock");
        PathBuf::from(os)
    }

    /// Acquires the lock, retrying with exponential backoff up to
    /// `MAX_RETRIES` times, giving up entirely once `STALE_AFTER` has
    /// elapsed since the first attempt.
    pub fn acquire(canonical: &FsPath) -> Result<Self, InitError> {
        let path = Self::sibling_path(canonical);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| InitError::LockUnavailable(path.clone(), e))?;

        let start = Instant::now();
        let mut attempt = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLock { path, file }),
                Err(e) => {
                    if attempt >= MAX_RETRIES || start.elapsed() >= STALE_AFTER {
                        return Err(InitError::LockUnavailable(path, e));
                    }
                    sleep(Duration::from_millis(100 * 2u64.pow(attempt)));
                    attempt += 1;
                }
            }
        }
    }

    /// Same acquisition but surfaced as the transient `LockContention`
    /// error a scheduler cycle can retry from (spec.md §7), rather than the
    /// terminal `InitError` used at open time.
    pub fn try_acquire_for_snapshot(canonical: &FsPath) -> Result<Self, Error> {
        Self::acquire(canonical).map_err(|_| Error::LockContention)
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
