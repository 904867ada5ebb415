//! Bounded signal inbox
//!
//! The controlling thread enqueues and the worker dequeues. Overflow drops the
//! signal; producers must tolerate loss.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::types::Signal;

#[derive(Debug)]
pub struct SignalQueue {
    capacity: usize,
    queue: Mutex<VecDeque<Signal>>,
}

impl SignalQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    /// Enqueue a signal, returning false if the queue is full
    pub fn push(&self, signal: Signal) -> bool {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            tracing::debug!(signal = %signal.name, "Signal queue full, dropping signal");
            return false;
        }
        queue.push_back(signal);
        true
    }

    pub fn pop(&self) -> Option<Signal> {
        self.queue.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Copy of the queue contents in delivery order
    pub fn snapshot(&self) -> Vec<Signal> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Replace the queue contents, keeping at most `capacity` signals
    pub fn replace(&self, signals: Vec<Signal>) {
        let mut queue = self.queue.lock();
        queue.clear();
        queue.extend(signals.into_iter().take(self.capacity));
    }
}
