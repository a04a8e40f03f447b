//! Error taxonomy for the document store.
//!
//! Mirrors the teacher's `ErrorCode` + `thiserror` pattern but gives each
//! failure kind the payload it actually needs instead of flattening
//! everything to a string.

use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds that can occur while opening a store.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("file not found: {0}")]
    FileMissing(PathBuf),
    #[error("snapshot content is not valid JSON: {0}")]
    SyntaxInvalid(#[source] serde_json::Error),
    #[error("failed to decrypt snapshot: authentication tag mismatch or malformed envelope")]
    DecryptionFailed,
    #[error("canonical path {0:?} escapes the working directory")]
    PathEscape(PathBuf),
    #[error("encryption key must be exactly 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("could not acquire advisory lock on {0:?}: {1}")]
    LockUnavailable(PathBuf, std::io::Error),
}

/// All failures the engine can surface to a caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open store: {0}")]
    Init(#[from] InitError),

    #[error("path type mismatch: {0}")]
    PathTypeMismatch(String),

    #[error("durability failure: {0}")]
    DurabilityFailed(String),

    #[error("unique index {index_name:?} already has an entry for {value}")]
    UniqueIndexViolation { index_name: String, value: serde_json::Value },

    #[error("validation rejected candidate document: {issues:?}")]
    ValidationFailed { issues: Vec<String> },

    #[error("transaction callback produced no replacement root")]
    TransactionAborted,

    #[error("engine is unusable after an unrecoverable initialization failure")]
    EngineUnusable,

    #[error("could not acquire the snapshot lock within the retry budget, will retry next cycle")]
    LockContention,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
