//! The document store façade (spec.md §6).
//!
//! Owns the document, the pending queue, the index manager, the WAL handle,
//! the advisory lock, and the save scheduler — all instance-scoped, no
//! process-wide state, matching spec.md §9 "Global state." Generalizes the
//! teacher's `KvStore` (which owns its log writer, its reader generation map,
//! and its in-memory index behind a single coarse lock) into a single-writer
//! JSON document engine.

use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::info;
use serde_json::Value;

use crate::codec::EncryptionKey;
use crate::document;
use crate::error::{Error, InitError, Result};
use crate::events::{Event, EventBus};
use crate::index::{IndexDefinition, IndexManager};
use crate::lock::FileLock;
use crate::mutation::Mutation;
use crate::path::Path;
use crate::query::{self, Predicate, QueryOptions};
use crate::recovery;
use crate::scheduler::{self, SaveCycle, Scheduler};
use crate::snapshot;
use crate::thread_pool::{SharedQueueThreadPool, ThreadPool};
use crate::validator::{NoopValidator, Validator};
use crate::wal::Wal;

const DEFAULT_SAVE_DELAY_MS: u64 = 60;

/// Library-side configuration, the fields of spec.md §6 Configuration
/// options. Built with `new()` and `with_*` methods rather than parsed from
/// argv — argv parsing lives in `src/bin/jsondb-cli.rs`.
pub struct EngineOptions {
    key: Option<[u8; 32]>,
    indented: bool,
    save_delay_ms: u64,
    indices: Vec<IndexDefinition>,
    validator: Option<Box<dyn Validator>>,
    use_wal: bool,
    silent: bool,
}

impl EngineOptions {
    pub fn new() -> Self {
        EngineOptions {
            key: None,
            indented: true,
            save_delay_ms: DEFAULT_SAVE_DELAY_MS,
            indices: Vec::new(),
            validator: None,
            use_wal: true,
            silent: false,
        }
    }

    pub fn with_key(mut self, key: [u8; 32]) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_indented(mut self, indented: bool) -> Self {
        self.indented = indented;
        self
    }

    pub fn with_save_delay_ms(mut self, ms: u64) -> Self {
        self.save_delay_ms = ms;
        self
    }

    pub fn with_indices(mut self, indices: Vec<IndexDefinition>) -> Self {
        self.indices = indices;
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_use_wal(mut self, use_wal: bool) -> Self {
        self.use_wal = use_wal;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Ready,
    Closing,
    Closed,
    Failed,
}

/// `queue.rs`'s `MutationQueue` exists as a standalone, independently tested
/// component (spec.md §4.7); this façade takes the direct-apply path spec.md
/// §9 "Pending queue vs direct apply" explicitly permits, since the engine's
/// single coarse `Mutex` already serializes every mutation through one
/// logical execution context without needing a separate batching buffer.
struct Inner {
    root: Value,
    index_manager: IndexManager,
    wal: Option<Wal>,
}

/// A handle to an in-flight (or already-resolved) durable write. `wait`
/// blocks until the next snapshot that includes this mutation completes,
/// per spec.md §5 "Suspension points."
pub struct Pending<T: Clone> {
    cycle: Arc<SaveCycle>,
    value: T,
}

impl<T: Clone> Pending<T> {
    pub fn wait(&self) -> Result<T> {
        self.cycle
            .wait()
            .map_err(Error::DurabilityFailed)?;
        Ok(self.value.clone())
    }
}

/// Top-level operation on a path, used by `batch` (spec.md §6).
pub enum BatchOp {
    Set { path: Path, value: Value },
    Delete { path: Path },
    Push { path: Path, items: Vec<Value> },
}

pub struct Engine {
    canonical: PathBuf,
    state: Mutex<EngineState>,
    inner: Arc<Mutex<Inner>>,
    _lock: FileLock,
    scheduler: Scheduler,
    validator: Box<dyn Validator>,
    events: Arc<EventBus>,
}

impl Engine {
    /// Opens `filename`, creating it with an empty root if missing, running
    /// recovery, and rebuilding every configured index (spec.md §3
    /// Lifecycle, §4.9).
    pub fn open(filename: &str, options: EngineOptions) -> Result<Engine> {
        let canonical = guard_path(filename)?;

        let key = match options.key {
            Some(bytes) => Some(EncryptionKey::new(&bytes).map_err(Error::Init)?),
            None => None,
        };

        let mut index_manager = IndexManager::new(options.indices);
        let tmp = snapshot::tmp_path(&canonical);
        let recovered = recovery::recover(&canonical, &tmp, key.as_ref(), &mut index_manager)?;

        let wal = if options.use_wal {
            Some(Wal::open_for_append(&canonical, recovered.wal_next_seq)?)
        } else {
            None
        };

        let lock = FileLock::acquire(&canonical)?;

        let inner = Arc::new(Mutex::new(Inner {
            root: recovered.root,
            index_manager,
            wal,
        }));

        let events = Arc::new(EventBus::new());

        let scheduler = {
            let inner = inner.clone();
            let canonical = canonical.clone();
            let key = key.clone();
            let indented = options.indented;
            let events = events.clone();
            let pool = SharedQueueThreadPool::new(1)?;
            Scheduler::new(
                Duration::from_millis(options.save_delay_ms),
                scheduler::into_spawn_fn(pool),
                move || save_cycle(&inner, &canonical, indented, key.as_ref(), &events),
            )
        };

        if !options.silent {
            info!("store opened at {:?}", canonical);
        }
        events.emit(Event::Ready);

        Ok(Engine {
            canonical,
            state: Mutex::new(EngineState::Ready),
            inner,
            _lock: lock,
            scheduler,
            validator: options.validator.unwrap_or_else(|| Box::new(NoopValidator)),
            events,
        })
    }

    fn check_ready(&self) -> Result<()> {
        if *self.state.lock().unwrap() == EngineState::Ready {
            Ok(())
        } else {
            Err(Error::EngineUnusable)
        }
    }

    pub fn get(&self, path: &Path) -> Result<Option<Value>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        Ok(crate::path::get(&inner.root, path).cloned())
    }

    pub fn has(&self, path: &Path) -> Result<bool> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        Ok(crate::path::has(&inner.root, path))
    }

    pub fn find_by_index(&self, name: &str, value: &Value) -> Result<Option<Value>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .index_manager
            .find_by_index(&inner.root, name, value)
            .cloned())
    }

    pub fn find_one(&self, path: &Path, predicate: &Predicate) -> Result<Option<Value>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        let array = match crate::path::get(&inner.root, path) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Ok(None),
        };
        Ok(query::find_one(&array, predicate).cloned())
    }

    pub fn find(&self, path: &Path, predicate: &Predicate, opts: &QueryOptions) -> Result<Vec<Value>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        let array = match crate::path::get(&inner.root, path) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Ok(Vec::new()),
        };
        Ok(query::find(&array, predicate, opts))
    }

    pub fn paginate(&self, path: &Path, page: usize, limit: usize) -> Result<Vec<Value>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        let array = match crate::path::get(&inner.root, path) {
            Some(Value::Array(items)) => items.clone(),
            _ => return Ok(Vec::new()),
        };
        let skip = page.saturating_sub(1).saturating_mul(limit);
        Ok(array.into_iter().skip(skip).take(limit).collect())
    }

    /// Sets `path` to `value`, returning a handle resolved on the next
    /// durable snapshot. No-op if the candidate root is structurally equal
    /// to the current root (spec.md §9 no-op elision).
    pub fn set(&self, path: &Path, value: Value) -> Result<Pending<()>> {
        self.check_ready()?;
        let mutation = Mutation::set(path, value);
        self.apply_mutation(mutation)
    }

    pub fn delete(&self, path: &Path) -> Result<Pending<()>> {
        self.check_ready()?;
        let mutation = Mutation::delete(path);
        self.apply_mutation(mutation)
    }

    /// Appends `items` to the array at `path`, skipping any item
    /// deep-equal to an existing element (spec.md §8 Push uniqueness).
    pub fn push(&self, path: &Path, items: Vec<Value>) -> Result<Pending<()>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        let mut array = match crate::path::get(&inner.root, path) {
            Some(Value::Array(items)) => items.clone(),
            None => Vec::new(),
            Some(_) => {
                return Err(Error::PathTypeMismatch(
                    "push target is not an array".to_string(),
                ))
            }
        };
        drop(inner);
        for item in items {
            if !array.iter().any(|existing| document::deep_equal(existing, &item)) {
                array.push(item);
            }
        }
        self.set(path, Value::Array(array))
    }

    /// Removes every element deep-equal to any of `items` from the array at
    /// `path` (spec.md §8 Pull semantics).
    pub fn pull(&self, path: &Path, items: Vec<Value>) -> Result<Pending<()>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        let array = match crate::path::get(&inner.root, path) {
            Some(Value::Array(items)) => items.clone(),
            None => return self.set(path, Value::Array(Vec::new())),
            Some(_) => {
                return Err(Error::PathTypeMismatch(
                    "pull target is not an array".to_string(),
                ))
            }
        };
        drop(inner);
        let filtered: Vec<Value> = array
            .into_iter()
            .filter(|existing| !items.iter().any(|item| document::deep_equal(existing, item)))
            .collect();
        self.set(path, Value::Array(filtered))
    }

    /// Atomically adds `amount` to the numeric value at `path` (absent
    /// treated as zero).
    pub fn add(&self, path: &Path, amount: f64) -> Result<Pending<()>> {
        self.check_ready()?;
        let inner = self.inner.lock().unwrap();
        let current = match crate::path::get(&inner.root, path) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            None => 0.0,
            Some(_) => {
                return Err(Error::PathTypeMismatch(
                    "add target is not a number".to_string(),
                ))
            }
        };
        drop(inner);
        let total = current + amount;
        let value = serde_json::Number::from_f64(total)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.set(path, value)
    }

    /// Runs `f` against a deep clone of the current root; the value it
    /// returns fully replaces the root. `f` returning `None` aborts with
    /// `TransactionAborted` and leaves the document unchanged.
    pub fn transaction<F>(&self, f: F) -> Result<Pending<Value>>
    where
        F: FnOnce(Value) -> Option<Value>,
    {
        self.check_ready()?;
        let current = {
            let inner = self.inner.lock().unwrap();
            inner.root.clone()
        };
        let new_root = f(current).ok_or(Error::TransactionAborted)?;
        if !new_root.is_object() {
            return Err(Error::PathTypeMismatch(
                "transaction must return an object root".to_string(),
            ));
        }
        self.replace_root(new_root.clone())?;
        let cycle = self.schedule_save();
        Ok(Pending {
            cycle,
            value: new_root,
        })
    }

    /// Replaces the document with `{}` (spec.md §6).
    pub fn clear(&self) -> Result<Pending<()>> {
        self.check_ready()?;
        self.replace_root(document::empty_root())?;
        let cycle = self.schedule_save();
        Ok(Pending { cycle, value: () })
    }

    /// Applies `ops` as a single all-or-nothing unit: if any op fails or the
    /// resulting document would violate a unique index, nothing is applied
    /// (spec.md §6).
    pub fn batch(&self, ops: Vec<BatchOp>) -> Result<Pending<()>> {
        self.check_ready()?;
        let mut inner = self.inner.lock().unwrap();
        let mut candidate = inner.root.clone();
        let mut mutations = Vec::with_capacity(ops.len());

        for op in ops {
            let mutation = match op {
                BatchOp::Set { path, value } => Mutation::set(&path, value),
                BatchOp::Delete { path } => Mutation::delete(&path),
                BatchOp::Push { path, items } => {
                    let mut array = match crate::path::get(&candidate, &path) {
                        Some(Value::Array(existing)) => existing.clone(),
                        _ => Vec::new(),
                    };
                    for item in items {
                        if !array.iter().any(|e| document::deep_equal(e, &item)) {
                            array.push(item);
                        }
                    }
                    Mutation::set(&path, Value::Array(array))
                }
            };
            mutation.apply(&mut candidate)?;
            mutations.push(mutation);
        }

        let issues = self.validator.validate(&candidate);
        if !issues.is_empty() {
            return Err(Error::ValidationFailed { issues });
        }

        let mut scratch = inner.index_manager.clone();
        scratch.rebuild_all(&candidate)?;

        if let Some(wal) = inner.wal.as_mut() {
            for mutation in &mutations {
                wal.append(mutation)
                    .map_err(|e| Error::DurabilityFailed(e.to_string()))?;
            }
        }

        inner.root = candidate;
        inner.index_manager = scratch;
        drop(inner);

        let cycle = self.schedule_save();
        Ok(Pending { cycle, value: () })
    }

    /// Copies the current canonical file to `<canonical>.<label>`, returning
    /// the new path. A thin passthrough kept at the façade boundary; backup
    /// scheduling itself is an external collaborator's concern (spec.md §1).
    pub fn snapshot_copy(&self, label: &str) -> Result<PathBuf> {
        self.check_ready()?;
        let mut target = self.canonical.clone().into_os_string();
        target.push(".");
        target.push(label);
        let target = PathBuf::from(target);
        fs::copy(&self.canonical, &target)?;
        Ok(target)
    }

    /// Awaits any in-flight and currently-armed save, then releases the
    /// advisory lock (by dropping `self`).
    pub fn close(self) {
        *self.state.lock().unwrap() = EngineState::Closing;
        self.scheduler.flush_and_wait();
        *self.state.lock().unwrap() = EngineState::Closed;
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<Event> {
        self.events.subscribe()
    }

    fn apply_mutation(&self, mutation: Mutation) -> Result<Pending<()>> {
        let mut inner = self.inner.lock().unwrap();

        let mut candidate = inner.root.clone();
        mutation.apply(&mut candidate)?;

        if mutation.path().is_root() && !document::is_valid_root(&candidate) {
            return Err(Error::PathTypeMismatch(
                "setting the root requires an object value".to_string(),
            ));
        }

        let issues = self.validator.validate(&candidate);
        if !issues.is_empty() {
            return Err(Error::ValidationFailed { issues });
        }

        if document::deep_equal(&candidate, &inner.root) {
            // Already resolved: hand back a cycle that is pre-completed by
            // nobody arming the scheduler. Reuse `notify` so the caller's
            // `.wait()` still blocks on a real (already-fired) cycle rather
            // than special-casing an immediately-ready value.
            drop(inner);
            return Ok(Pending {
                cycle: already_satisfied_cycle(),
                value: (),
            });
        }

        let plans = inner
            .index_manager
            .plan_update(&inner.root, &candidate, &mutation)?;

        if let Some(wal) = inner.wal.as_mut() {
            wal.append(&mutation)
                .map_err(|e| Error::DurabilityFailed(e.to_string()))?;
        }

        inner.index_manager.commit_plan(plans);
        inner.root = candidate;
        drop(inner);

        let cycle = self.schedule_save();
        Ok(Pending { cycle, value: () })
    }

    fn replace_root(&self, new_root: Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let issues = self.validator.validate(&new_root);
        if !issues.is_empty() {
            return Err(Error::ValidationFailed { issues });
        }

        if document::deep_equal(&new_root, &inner.root) {
            return Ok(());
        }

        let mut scratch = inner.index_manager.clone();
        scratch.rebuild_all(&new_root)?;

        if let Some(wal) = inner.wal.as_mut() {
            let mutation = Mutation::set(&Path::root(), new_root.clone());
            wal.append(&mutation)
                .map_err(|e| Error::DurabilityFailed(e.to_string()))?;
        }

        inner.root = new_root;
        inner.index_manager = scratch;
        Ok(())
    }

    fn schedule_save(&self) -> Arc<SaveCycle> {
        self.scheduler.notify()
    }
}

/// A `SaveCycle` that nobody will ever arm again, used to give no-op
/// mutations a handle whose `.wait()` still behaves correctly — it resolves
/// immediately because this cycle is never registered with the scheduler,
/// so its shared state starts and stays `Some(Ok(()))`.
fn already_satisfied_cycle() -> Arc<SaveCycle> {
    let cycle = SaveCycle::new_resolved(Ok(()));
    Arc::new(cycle)
}

fn save_cycle(
    inner: &Arc<Mutex<Inner>>,
    canonical: &FsPath,
    indented: bool,
    key: Option<&EncryptionKey>,
    events: &EventBus,
) -> std::result::Result<(), String> {
    let doc = {
        let guard = inner.lock().unwrap();
        guard.root.clone()
    };
    match snapshot::write_locked(canonical, &doc, indented, key) {
        Ok(()) => {
            let mut guard = inner.lock().unwrap();
            if let Some(wal) = guard.wal.as_mut() {
                if let Err(e) = wal.truncate() {
                    let msg = e.to_string();
                    events.emit(Event::Error(msg.clone()));
                    return Err(msg);
                }
            }
            drop(guard);
            events.emit(Event::Write);
            Ok(())
        }
        Err(e) => {
            let msg = e.to_string();
            events.emit(Event::Error(msg.clone()));
            Err(msg)
        }
    }
}

/// Lexically resolves `.`/`..` components without touching the filesystem
/// (the canonical file may not exist yet, so `fs::canonicalize` can't be
/// used directly).
fn normalize_lexically(path: &FsPath) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Enforces spec.md §6's path containment guard: the canonical filename,
/// after normalization, must be inside the process working directory.
fn guard_path(filename: &str) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let candidate = normalize_lexically(&cwd.join(filename));
    let cwd_normalized = normalize_lexically(&cwd);
    if !candidate.starts_with(&cwd_normalized) {
        return Err(Error::Init(InitError::PathEscape(candidate)));
    }
    Ok(candidate)
}
