//! The tagged mutation record applied to the document.
//!
//! Higher-level array operations (`push`, `pull`, `add`) are lowered to
//! `Set` against the containing path after a read-modify step executed
//! under the engine's single-writer discipline (spec.md §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Mutation {
    Set { path: String, value: Value },
    Delete { path: String },
}

impl Mutation {
    pub fn set(path: &Path, value: Value) -> Self {
        Mutation::Set {
            path: path.as_string(),
            value,
        }
    }

    pub fn delete(path: &Path) -> Self {
        Mutation::Delete {
            path: path.as_string(),
        }
    }

    pub fn path(&self) -> Path {
        match self {
            Mutation::Set { path, .. } => Path::parse(path),
            Mutation::Delete { path } => Path::parse(path),
        }
    }

    /// Applies this mutation to `doc` in place.
    pub fn apply(&self, doc: &mut Value) -> crate::error::Result<()> {
        match self {
            Mutation::Set { path, value } => {
                crate::path::set(doc, &Path::parse(path), value.clone())
            }
            Mutation::Delete { path } => {
                crate::path::unset(doc, &Path::parse(path)).map(|_| ())
            }
        }
    }
}
