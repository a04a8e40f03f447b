//! Write-Ahead Log.
//!
//! An append-only sibling file (`<canonical>.wal`) of length-framed
//! records: `[u32 big-endian length][UTF-8 JSON {"seq": N, "op": {...}}]`.
//! The on-disk framing generalizes the teacher's network wire protocol
//! (`common.rs::handle_send`/`handle_receive`, a 2-byte length prefix for
//! TCP frames) to a 4-byte prefix, since a file's record can need to carry
//! an arbitrarily large JSON value while the network protocol's `u16` cap
//! was sized for small RPC payloads only.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path as FsPath, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mutation::Mutation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub op: Mutation,
}

pub struct Wal {
    path: PathBuf,
    writer: File,
    next_seq: u64,
}

impl Wal {
    /// Path of the WAL sibling of `canonical`.
    pub fn sibling_path(canonical: &FsPath) -> PathBuf {
        let mut os = canonical.as_os_str().to_owned();
        os.push(".wal");
        PathBuf::from(os)
    }

    pub fn exists(canonical: &FsPath) -> bool {
        Self::sibling_path(canonical).exists()
    }

    /// Opens (creating if necessary) the WAL for appending, starting
    /// sequence numbers at `next_seq`.
    pub fn open_for_append(canonical: &FsPath, next_seq: u64) -> Result<Self> {
        let path = Self::sibling_path(canonical);
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Wal {
            path,
            writer,
            next_seq,
        })
    }

    /// Appends one mutation, flushing and syncing before returning. The
    /// sequence number is the next monotonically increasing value.
    pub fn append(&mut self, op: &Mutation) -> Result<u64> {
        let seq = self.next_seq;
        let entry = WalEntry {
            seq,
            op: op.clone(),
        };
        let payload = serde_json::to_vec(&entry)?;
        let len = (payload.len() as u32).to_be_bytes();
        self.writer.write_all(&len)?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        self.writer.sync_data()?;
        self.next_seq += 1;
        Ok(seq)
    }

    /// Truncates the log to zero length and resets the sequence counter to
    /// one. Called only by the snapshot writer, only after the snapshot
    /// rename has completed (spec.md §4.4).
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.set_len(0)?;
        // `set_len` doesn't reposition the cursor on every platform;
        // reopen in append mode so the next write starts from offset 0.
        self.writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.next_seq = 1;
        Ok(())
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

/// Reads every well-formed entry from the WAL sibling of `canonical`, in
/// order. Malformed trailing data — a short read, a length exceeding the
/// remaining bytes, or a parse failure — is ignored; this models a crash
/// mid-append (spec.md §4.4). Returns the entries and the sequence number
/// the next append should use.
pub fn read_all(canonical: &FsPath) -> Result<(Vec<WalEntry>, u64)> {
    let path = Wal::sibling_path(canonical);
    if !path.exists() {
        return Ok((Vec::new(), 1));
    }
    let file = File::open(&path)?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut max_seq = 0u64;

    loop {
        let mut len_buf = [0u8; 4];
        match read_exact_or_eof(&mut reader, &mut len_buf)? {
            ReadOutcome::Eof => break,
            ReadOutcome::Short => break,
            ReadOutcome::Full => {}
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        match read_exact_or_eof(&mut reader, &mut payload)? {
            ReadOutcome::Full => {}
            _ => break,
        }
        match serde_json::from_slice::<WalEntry>(&payload) {
            Ok(entry) => {
                max_seq = max_seq.max(entry.seq);
                entries.push(entry);
            }
            Err(_) => break,
        }
    }

    Ok((entries, max_seq + 1))
}

enum ReadOutcome {
    Full,
    Short,
    Eof,
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => {
                return Ok(if total == 0 {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Short
                })
            }
            n => total += n,
        }
    }
    Ok(ReadOutcome::Full)
}
