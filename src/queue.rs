//! Mutation Queue.
//!
//! An ordered buffer of mutations not yet applied to the live document,
//! amortizing index maintenance across bursts of writes (spec.md §4.7).

use std::collections::VecDeque;

use crate::mutation::Mutation;

/// Default threshold above which the queue is force-applied (spec.md §3).
pub const DEFAULT_MAX_LEN: usize = 1000;

pub struct MutationQueue {
    entries: VecDeque<Mutation>,
    max_len: usize,
}

impl MutationQueue {
    pub fn new(max_len: usize) -> Self {
        MutationQueue {
            entries: VecDeque::new(),
            max_len,
        }
    }

    /// Pushes a mutation, returning true iff the queue has now reached its
    /// configured threshold and should be flushed.
    pub fn push(&mut self, mutation: Mutation) -> bool {
        self.entries.push_back(mutation);
        self.entries.len() >= self.max_len
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drains every pending entry in strict FIFO order.
    pub fn drain(&mut self) -> Vec<Mutation> {
        self.entries.drain(..).collect()
    }
}

impl Default for MutationQueue {
    fn default() -> Self {
        MutationQueue::new(DEFAULT_MAX_LEN)
    }
}
