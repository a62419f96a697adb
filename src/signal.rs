//! Single-slot rendezvous signals for protocol confirmations.
//!
//! State changes, port enable/disable, and flush are asynchronous commands:
//! the caller blocks on a [`Rendezvous`] until the component's notification
//! thread confirms completion. A session failure aborts every signal so no
//! waiter is left blocked.

use crate::error::{Error, Result};
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalState {
    Idle,
    Completed,
    Aborted,
}

/// A single-slot completion signal: one pending waiter, one completion.
///
/// `complete` stores the completion; `wait` consumes it. A completion that
/// arrives before the waiter is not lost. `abort` is sticky — once aborted,
/// every current and future `wait` returns [`Error::Aborted`].
#[derive(Debug)]
pub struct Rendezvous {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl Rendezvous {
    /// Create an idle signal.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Idle),
            cond: Condvar::new(),
        }
    }

    /// Record a completion and wake the waiter.
    ///
    /// Ignored after abort; the failure outcome must win.
    pub fn complete(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != SignalState::Aborted {
            *state = SignalState::Completed;
            self.cond.notify_all();
        }
    }

    /// Abort the signal, waking any waiter with a failure. Sticky.
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        *state = SignalState::Aborted;
        self.cond.notify_all();
    }

    /// Block until the signal completes or aborts. A completion is consumed
    /// so the signal can be reused for the next confirmation.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        loop {
            match *state {
                SignalState::Completed => {
                    *state = SignalState::Idle;
                    return Ok(());
                }
                SignalState::Aborted => return Err(Error::Aborted),
                SignalState::Idle => {
                    state = self.cond.wait(state).unwrap();
                }
            }
        }
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_complete_before_wait_is_not_lost() {
        let signal = Rendezvous::new();
        signal.complete();
        assert!(signal.wait().is_ok());
    }

    #[test]
    fn test_wait_consumes_completion() {
        let signal = Arc::new(Rendezvous::new());
        signal.complete();
        signal.wait().unwrap();

        // A second wait must block again until the next completion.
        let waiter = Arc::clone(&signal);
        let handle = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(50));
        signal.complete();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_abort_wakes_waiter_with_failure() {
        let signal = Arc::new(Rendezvous::new());
        let waiter = Arc::clone(&signal);

        let handle = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(50));
        signal.abort();

        assert_eq!(handle.join().unwrap(), Err(Error::Aborted));
    }

    #[test]
    fn test_abort_is_sticky() {
        let signal = Rendezvous::new();
        signal.abort();
        signal.complete(); // must not override the failure
        assert_eq!(signal.wait(), Err(Error::Aborted));
        assert_eq!(signal.wait(), Err(Error::Aborted));
    }
}
