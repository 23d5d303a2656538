// src/io/channel.rs
//
// Unbounded FIFO handoff between threads with a blocking pop.
//
// Used for the outbound frame queue (application -> transmit loop) and the
// inbound text queue (transport -> receive loop). Closing the channel is the
// shutdown path: poppers drain what is left and then get `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

struct ChannelState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Multi-producer FIFO with blocking `pop`.
pub struct BlockingChannel<T> {
    state: Mutex<ChannelState<T>>,
    available: Condvar,
}

impl<T> Default for BlockingChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // Poison is ignored, the queue is never left half-updated
    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append to the tail and wake one waiting popper. Never blocks.
    ///
    /// Returns the item back if the channel has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.queue.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head, blocking until one is available.
    ///
    /// Returns `None` only once the channel is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Instantaneous queue length.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further pushes and wake every waiting popper.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
