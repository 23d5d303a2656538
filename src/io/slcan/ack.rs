// src/io/slcan/ack.rs
//
// Single-slot acknowledgement signal between the receive and transmit loops.
//
// Auto-reset semantics: a successful wait consumes the signal, so one ack
// line from the device releases at most one transmitted frame.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// "Was the most recently written line acknowledged?"
#[derive(Default)]
pub struct PendingAck {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl PendingAck {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.signalled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raise the signal, releasing a waiting transmitter if there is one.
    pub fn set(&self) {
        *self.lock() = true;
        self.cond.notify_one();
    }

    /// Drop any stale signal before a new line is written.
    pub fn reset(&self) {
        *self.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Wait up to `timeout` for the signal. Returns `true` and clears the
    /// signal if it was raised in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signalled = self.lock();

        while !*signalled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(signalled, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            signalled = guard;
        }

        *signalled = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_without_signal() {
        let ack = PendingAck::new();
        let start = Instant::now();
        assert!(!ack.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_signal_before_wait_is_consumed() {
        let ack = PendingAck::new();
        ack.set();
        assert!(ack.is_set());
        assert!(ack.wait_timeout(Duration::from_millis(10)));
        assert!(!ack.is_set());
        assert!(!ack.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_reset_clears_stale_signal() {
        let ack = PendingAck::new();
        ack.set();
        ack.reset();
        assert!(!ack.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let ack = Arc::new(PendingAck::new());
        let setter = {
            let ack = ack.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ack.set();
            })
        };

        assert!(ack.wait_timeout(Duration::from_secs(5)));
        setter.join().unwrap();
    }
}
