//! Path Resolver.
//!
//! Parses dot-separated paths into segment sequences and performs
//! get/set/unset/has against a `serde_json::Value` tree.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A parsed, non-empty-or-empty sequence of path segments. The empty
/// sequence denotes the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path(Vec<String>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn as_string(&self) -> String {
        self.0.iter().map(|s| s.replace('.', "\\.")).collect::<Vec<_>>().join(".")
    }

    /// Returns a new path with `segment` appended.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    /// Splits a raw path string into segments. `\.` is an escaped literal
    /// dot inside a segment; unescaped `.` characters split segments. The
    /// empty string parses to the root path.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Path::root();
        }
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'.') => {
                    current.push('.');
                    chars.next();
                }
                '.' => {
                    segments.push(std::mem::take(&mut current));
                }
                other => current.push(other),
            }
        }
        segments.push(current);
        Path(segments)
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path::parse(raw)
    }
}

impl From<String> for Path {
    fn from(raw: String) -> Self {
        Path::parse(&raw)
    }
}

fn is_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    segment.parse::<usize>().ok()
}

/// Read-only traversal. Returns `None` on any missing intermediate.
pub fn get<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx = is_index(segment)?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// True iff every segment resolves; a terminal JSON `null` counts as
/// present.
pub fn has(doc: &Value, path: &Path) -> bool {
    get(doc, path).is_some()
}

/// Creates missing intermediates as objects, overwrites the terminal value.
/// Setting at the root replaces the whole document; the replacement must be
/// an object (enforced by the caller, which owns the root-replacement rule).
pub fn set(doc: &mut Value, path: &Path, value: Value) -> Result<()> {
    if path.is_root() {
        *doc = value;
        return Ok(());
    }
    let segments = path.segments();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        current = step_create(current, segment)?;
    }
    let last = &segments[segments.len() - 1];
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            let idx = is_index(last).ok_or_else(|| {
                Error::PathTypeMismatch(format!(
                    "segment {:?} is not a valid array index",
                    last
                ))
            })?;
            if idx == items.len() {
                items.push(value);
            } else if idx < items.len() {
                items[idx] = value;
            } else {
                return Err(Error::PathTypeMismatch(format!(
                    "index {} out of bounds for array of length {}",
                    idx,
                    items.len()
                )));
            }
        }
        _ => {
            return Err(Error::PathTypeMismatch(
                "cannot set a field on a scalar value".to_string(),
            ))
        }
    }
    Ok(())
}

/// Steps into (creating if necessary) the child named by `segment`,
/// creating missing intermediates as objects only — never as arrays, even
/// when `segment` is numeric.
fn step_create<'a>(current: &'a mut Value, segment: &str) -> Result<&'a mut Value> {
    match current {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let idx = is_index(segment).ok_or_else(|| {
                Error::PathTypeMismatch(format!(
                    "segment {:?} is not a valid array index",
                    segment
                ))
            })?;
            if idx == items.len() {
                items.push(Value::Object(Map::new()));
                Ok(items.last_mut().expect("just pushed"))
            } else if idx < items.len() {
                Ok(&mut items[idx])
            } else {
                Err(Error::PathTypeMismatch(format!(
                    "index {} out of bounds for array of length {}",
                    idx,
                    items.len()
                )))
            }
        }
        Value::Null => {
            *current = Value::Object(Map::new());
            step_create(current, segment)
        }
        _ => Err(Error::PathTypeMismatch(
            "cannot descend into a scalar value".to_string(),
        )),
    }
}

/// Removes the terminal value. Returns true iff a value was present.
pub fn unset(doc: &mut Value, path: &Path) -> Result<bool> {
    if path.is_root() {
        return Err(Error::PathTypeMismatch(
            "cannot unset the document root".to_string(),
        ));
    }
    let segments = path.segments();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        current = match current {
            Value::Object(map) => match map.get_mut(segment) {
                Some(v) => v,
                None => return Ok(false),
            },
            Value::Array(items) => {
                let idx = match is_index(segment) {
                    Some(i) => i,
                    None => {
                        return Err(Error::PathTypeMismatch(format!(
                            "segment {:?} is not a valid array index",
                            segment
                        )))
                    }
                };
                match items.get_mut(idx) {
                    Some(v) => v,
                    None => return Ok(false),
                }
            }
            _ => return Ok(false),
        };
    }
    let last = &segments[segments.len() - 1];
    match current {
        Value::Object(map) => Ok(map.remove(last).is_some()),
        Value::Array(items) => {
            let idx = match is_index(last) {
                Some(i) => i,
                None => {
                    return Err(Error::PathTypeMismatch(format!(
                        "segment {:?} is not a valid array index",
                        last
                    )))
                }
            };
            if idx < items.len() {
                items.remove(idx);
                Ok(true)
            } else {
                Ok(false)
            }
        }
        _ => Ok(false),
    }
}
