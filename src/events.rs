//! `ready` / `write` / `error` event bus.
//!
//! Events map onto a bounded channel so a slow observer can never block the
//! engine (spec.md §9): a full channel drops the oldest *non-critical*
//! event to make room; `error` events are never dropped. Built on
//! `crossbeam-channel`, the same channel crate the teacher already uses for
//! its thread pool (`thread_pool/shared_pool.rs`).

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub enum Event {
    Ready,
    Write,
    Error(String),
}

impl Event {
    fn is_critical(&self) -> bool {
        matches!(self, Event::Error(_))
    }
}

pub struct EventBus {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(EVENT_BUFFER);
        EventBus { sender, receiver }
    }

    /// Emits `event`. On a full buffer, a non-critical event makes room for
    /// itself by dropping the oldest buffered event; a critical (`error`)
    /// event is never dropped — it waits for a slot.
    pub fn emit(&self, event: Event) {
        if event.is_critical() {
            let _ = self.sender.send(event);
            return;
        }
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let _ = self.receiver.try_recv();
                let _ = self.sender.try_send(event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        self.receiver.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}
