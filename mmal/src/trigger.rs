// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! One-shot completion signals for processing operations.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// How a processing operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The stream ended normally (end-of-stream or end-of-frame).
    EndOfStream,
    /// The operation was stopped on request.
    ForceStopped,
    /// The operation's deadline passed.
    TimedOut,
    /// A transmission failure or error event ended the operation.
    Failed,
}

impl Completion {
    /// Returns `true` unless the operation failed.
    pub fn is_success(self) -> bool {
        !matches!(self, Completion::Failed)
    }

    fn merge(current: Option<Completion>, next: Completion) -> Completion {
        match current {
            Some(Completion::Failed) => Completion::Failed,
            Some(current) if next != Completion::Failed => current,
            _ => next,
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Completion::EndOfStream => "end of stream",
            Completion::ForceStopped => "force stopped",
            Completion::TimedOut => "timed out",
            Completion::Failed => "failed",
        };
        f.write_str(text)
    }
}

struct TriggerState {
    outcome: Option<Completion>,
    pending: Option<Completion>,
    remaining: u32,
    wakers: Vec<Waker>,
}

struct TriggerInner {
    name: String,
    state: Mutex<TriggerState>,
    resolved: Condvar,
}

/// A completion signal that resolves exactly once.
///
/// A trigger may count down several participants; it resolves when the last
/// one signals. A [`Completion::Failed`] signal from any participant wins over
/// the others. Waiters can block ([`Trigger::wait_timeout`]) or await
/// ([`Trigger::wait`]).
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

impl Trigger {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_count(name, 1)
    }

    /// Creates a trigger that resolves after `count` signals.
    pub fn with_count(name: impl Into<String>, count: u32) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                name: name.into(),
                state: Mutex::new(TriggerState {
                    outcome: None,
                    pending: None,
                    remaining: count.max(1),
                    wakers: Vec::new(),
                }),
                resolved: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Counts one participant down.
    ///
    /// Returns `true` if this call resolved the trigger. Signals arriving after
    /// resolution are ignored.
    pub fn signal(&self, completion: Completion) -> bool {
        let wakers = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                trace!(
                    "Trigger {}: ignoring late signal ({completion}).",
                    self.inner.name
                );
                return false;
            }
            state.pending = Some(Completion::merge(state.pending, completion));
            state.remaining -= 1;
            if state.remaining > 0 {
                return false;
            }
            state.outcome = state.pending;
            self.inner.resolved.notify_all();
            std::mem::take(&mut state.wakers)
        };
        trace!("Trigger {}: resolved ({completion}).", self.inner.name);
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<Completion> {
        self.inner.state.lock().outcome
    }

    /// Returns a future resolving to the outcome.
    pub fn wait(&self) -> TriggerWait {
        TriggerWait {
            trigger: self.clone(),
        }
    }

    /// Blocks the calling thread for at most `bound`.
    pub fn wait_timeout(&self, bound: Duration) -> Option<Completion> {
        let deadline = Instant::now() + bound;
        let mut state = self.inner.state.lock();
        while state.outcome.is_none() {
            if self
                .inner
                .resolved
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        state.outcome
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.inner.name)
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Future returned by [`Trigger::wait`].
pub struct TriggerWait {
    trigger: Trigger,
}

impl Future for TriggerWait {
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Completion> {
        let mut state = self.trigger.inner.state.lock();
        if let Some(outcome) = state.outcome {
            return Poll::Ready(outcome);
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    #[test]
    fn resolves_exactly_once_under_contention() {
        let trigger = Trigger::new("contended");
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let trigger = trigger.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    if trigger.signal(Completion::EndOfStream) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.outcome(), Some(Completion::EndOfStream));
    }

    #[test]
    fn countdown_keeps_failure() {
        let trigger = Trigger::with_count("joined", 3);
        assert!(!trigger.signal(Completion::EndOfStream));
        assert!(!trigger.signal(Completion::Failed));
        assert!(!trigger.is_completed());
        assert!(trigger.signal(Completion::ForceStopped));
        assert_eq!(trigger.outcome(), Some(Completion::Failed));
    }

    #[test]
    fn async_waiter_wakes() {
        let trigger = Trigger::new("async");
        let signaller = trigger.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal(Completion::TimedOut);
        });
        let outcome = futures::executor::block_on(trigger.wait());
        assert_eq!(outcome, Completion::TimedOut);
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_expires() {
        let trigger = Trigger::new("idle");
        assert_eq!(trigger.wait_timeout(Duration::from_millis(10)), None);
    }
}
