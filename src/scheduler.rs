//! Debounced single-shot save scheduler (spec.md §4.6).
//!
//! The teacher repo never reaches for an async runtime across its four
//! course projects — concurrency there is always threads, channels, and
//! explicit synchronization (`thread_pool/shared_pool.rs`,
//! `thread_pool/mpmc.rs`). This scheduler follows the same discipline: a
//! dedicated background thread owns the debounce timer, and callers
//! coalesced into one cycle block on a `Condvar`-backed `SaveCycle` rather
//! than polling an async `Future`. The async command surface spec.md §1
//! calls an out-of-scope external collaborator is exactly the layer that
//! would wrap `SaveCycle::wait` in a real `Future`.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::thread_pool::ThreadPool;

/// A boxed unit of work handed to a `ThreadPool`. `ThreadPool::spawn` is
/// generic, so it can't be stored behind `dyn ThreadPool`; callers erase a
/// concrete pool into this shape once, at construction time — see
/// `into_spawn_fn`.
pub type BoxedJob = Box<dyn FnOnce() + Send + 'static>;
pub type SpawnFn = Arc<dyn Fn(BoxedJob) + Send + Sync>;

/// Adapts any concrete `ThreadPool` into a `SpawnFn` the scheduler can store
/// without needing the pool's type parameter.
pub fn into_spawn_fn<P: ThreadPool + Send + Sync + 'static>(pool: P) -> SpawnFn {
    Arc::new(move |job: BoxedJob| pool.spawn(job))
}

/// The outcome every caller coalesced into one debounce window observes,
/// once the scheduler fires and the snapshot completes (or fails).
pub struct SaveCycle {
    outcome: Mutex<Option<Result<(), String>>>,
    condvar: Condvar,
}

impl SaveCycle {
    fn new() -> Arc<Self> {
        Arc::new(SaveCycle {
            outcome: Mutex::new(None),
            condvar: Condvar::new(),
        })
    }

    /// A cycle that is already resolved, for callers (like a no-op
    /// mutation) that have nothing to wait on but still want a uniform
    /// `Pending` handle.
    pub fn new_resolved(result: Result<(), String>) -> Self {
        SaveCycle {
            outcome: Mutex::new(Some(result)),
            condvar: Condvar::new(),
        }
    }

    fn resolve(&self, result: Result<(), String>) {
        let mut guard = self.outcome.lock().unwrap();
        *guard = Some(result);
        self.condvar.notify_all();
    }

    /// Blocks until this cycle's snapshot has completed (or failed).
    pub fn wait(&self) -> Result<(), String> {
        let mut guard = self.outcome.lock().unwrap();
        while guard.is_none() {
            guard = self.condvar.wait(guard).unwrap();
        }
        guard.clone().unwrap()
    }
}

struct State {
    deadline: Option<Instant>,
    pending: Option<Arc<SaveCycle>>,
    in_flight: bool,
    shutdown: bool,
}

pub struct Scheduler {
    state: Arc<Mutex<State>>,
    cv: Arc<Condvar>,
    delay: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the background timer thread. `save_fn` performs the actual
    /// snapshot write; each firing is dispatched through `spawn` (built from
    /// a `ThreadPool` via `into_spawn_fn`) so the timer thread is never
    /// blocked on I/O — the "separate I/O pathway for snapshot writes"
    /// spec.md §5 requires.
    pub fn new<F>(delay: Duration, spawn: SpawnFn, save_fn: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        let state = Arc::new(Mutex::new(State {
            deadline: None,
            pending: None,
            in_flight: false,
            shutdown: false,
        }));
        let cv = Arc::new(Condvar::new());

        let thread_state = state.clone();
        let thread_cv = cv.clone();
        let save_fn = Arc::new(save_fn);
        let handle = thread::spawn(move || run(thread_state, thread_cv, spawn, save_fn));

        Scheduler {
            state,
            cv,
            delay,
            handle: Some(handle),
        }
    }

    /// Arms (or re-arms) the debounce timer and returns the `SaveCycle`
    /// this mutation was coalesced into. Consecutive calls before the timer
    /// fires all return the same cycle (spec.md §4.6); a call arriving
    /// while a save is in flight is coalesced into a fresh cycle for the
    /// next one, since at most one save runs at a time (spec.md §4.6
    /// Fairness).
    pub fn notify(&self) -> Arc<SaveCycle> {
        let mut guard = self.state.lock().unwrap();
        let cycle = match &guard.pending {
            Some(c) => c.clone(),
            None => {
                let c = SaveCycle::new();
                guard.pending = Some(c.clone());
                c
            }
        };
        guard.deadline = Some(Instant::now() + self.delay);
        self.cv.notify_all();
        cycle
    }

    /// Forces the current debounce window to fire immediately (if any is
    /// armed) and waits for it, then waits for any in-flight save. Used by
    /// `close()` (spec.md §4.6 "close awaits the current save").
    pub fn flush_and_wait(&self) -> Option<Result<(), String>> {
        let pending_cycle = {
            let mut guard = self.state.lock().unwrap();
            if guard.pending.is_some() {
                guard.deadline = Some(Instant::now());
                self.cv.notify_all();
            }
            guard.pending.clone()
        };
        let result = pending_cycle.as_ref().map(|c| c.wait());
        // also wait for a concurrently in-flight save that this same
        // window may have handed off to.
        loop {
            let still_in_flight = {
                let guard = self.state.lock().unwrap();
                guard.in_flight
            };
            if !still_in_flight {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        result
    }

    pub fn shutdown(&mut self) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.shutdown = true;
        }
        self.cv.notify_all();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn run<F>(state: Arc<Mutex<State>>, cv: Arc<Condvar>, spawn: SpawnFn, save_fn: Arc<F>)
where
    F: Fn() -> Result<(), String> + Send + Sync + 'static,
{
    let mut guard = state.lock().unwrap();
    loop {
        if guard.shutdown {
            return;
        }
        match guard.deadline {
            None => {
                guard = cv.wait(guard).unwrap();
            }
            Some(deadline) => {
                let now = Instant::now();
                if guard.in_flight {
                    guard = cv.wait(guard).unwrap();
                } else if now >= deadline {
                    let cycle = guard.pending.take();
                    guard.deadline = None;
                    guard.in_flight = true;
                    drop(guard);

                    let job_state = state.clone();
                    let job_cv = cv.clone();
                    let job_save_fn = save_fn.clone();
                    (spawn)(Box::new(move || {
                        let result = job_save_fn();
                        let mut g = job_state.lock().unwrap();
                        g.in_flight = false;
                        if let Some(c) = cycle {
                            c.resolve(result);
                        }
                        drop(g);
                        job_cv.notify_all();
                    }));

                    guard = state.lock().unwrap();
                } else {
                    let (g, _timeout) = cv.wait_timeout(guard, deadline - now).unwrap();
                    guard = g;
                }
            }
        }
    }
}
