use std::thread;

use super::ThreadPool;

/// Spawns a fresh OS thread per job instead of reusing a fixed pool. Kept as
/// the cheapest possible `ThreadPool` impl to compare against
/// `SharedQueueThreadPool` — `threads` is accepted for a uniform
/// constructor but otherwise unused, since there's no pool to size.
pub struct NaiveThreadPool;

impl ThreadPool for NaiveThreadPool {
    fn new(_threads: u32) -> crate::Result<Self>
    where
        Self: Sized,
    {
        Ok(NaiveThreadPool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        thread::spawn(job);
    }
}
