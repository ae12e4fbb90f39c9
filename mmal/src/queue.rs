// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Thread-safe FIFO of buffer handles.

use std::{
    collections::VecDeque,
    mem,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::{
    Error, Result,
    buffer::{Buffer, BufferHeader},
};

struct QueueState {
    items: VecDeque<Buffer>,
    destroyed: bool,
}

pub(crate) struct QueueInner {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl QueueInner {
    /// Returns a header whose last reference was released.
    pub(crate) fn push_header(&self, header: Arc<BufferHeader>) {
        let buffer = header.into_buffer();
        let mut state = self.state.lock();
        if state.destroyed {
            drop(state);
            trace!("Queue destroyed, freeing returned buffer header.");
            buffer.forget();
            return;
        }
        state.items.push_back(buffer);
        self.changed.notify_all();
    }
}

/// Unbounded FIFO of [`Buffer`] handles.
///
/// `put` never blocks. Retrieval either polls ([`Queue::get`]) or blocks
/// ([`Queue::wait`], [`Queue::timed_wait`]). Once destroyed, retrieval fails
/// with [`Error::QueueDestroyed`] and buffers put into the queue are released.
///
/// Buffers are always dropped outside the queue lock: dropping a buffer may
/// recycle it into this very queue.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Queue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    destroyed: false,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Removes the oldest buffer without blocking.
    pub fn get(&self) -> Result<Option<Buffer>> {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(Error::QueueDestroyed);
        }
        Ok(state.items.pop_front())
    }

    /// Blocks until a buffer is available.
    pub fn wait(&self) -> Result<Buffer> {
        let mut state = self.inner.state.lock();
        loop {
            if state.destroyed {
                return Err(Error::QueueDestroyed);
            }
            if let Some(buffer) = state.items.pop_front() {
                return Ok(buffer);
            }
            self.inner.changed.wait(&mut state);
        }
    }

    /// Blocks for at most `bound` until a buffer is available.
    pub fn timed_wait(&self, bound: Duration) -> Result<Option<Buffer>> {
        let deadline = Instant::now() + bound;
        let mut state = self.inner.state.lock();
        loop {
            if state.destroyed {
                return Err(Error::QueueDestroyed);
            }
            if let Some(buffer) = state.items.pop_front() {
                return Ok(Some(buffer));
            }
            if self
                .inner
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.destroyed {
                    return Err(Error::QueueDestroyed);
                }
                return Ok(state.items.pop_front());
            }
        }
    }

    /// Appends a buffer and wakes any waiter.
    pub fn put(&self, buffer: Buffer) {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            drop(state);
            warn!("Buffer put into a destroyed queue, releasing it.");
            buffer.release();
            return;
        }
        state.items.push_back(buffer);
        self.inner.changed.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys the queue, releasing every buffer still in it.
    pub fn destroy(&self) {
        let items = {
            let mut state = self.inner.state.lock();
            state.destroyed = true;
            self.inner.changed.notify_all();
            mem::take(&mut state.items)
        };
        drop(items);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Waits until the queue holds at least `target` buffers or `deadline`
    /// passes. Returns whether the target was reached.
    pub(crate) fn wait_for_len(&self, target: usize, deadline: Instant) -> Result<bool> {
        let mut state = self.inner.state.lock();
        loop {
            if state.destroyed {
                return Err(Error::QueueDestroyed);
            }
            if state.items.len() >= target {
                return Ok(true);
            }
            if self
                .inner
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(state.items.len() >= target);
            }
        }
    }

    /// Removes every queued buffer at once.
    pub(crate) fn take_all(&self) -> Vec<Buffer> {
        let mut state = self.inner.state.lock();
        state.items.drain(..).collect()
    }

    pub(crate) fn downgrade(&self) -> Weak<QueueInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn push_header(&self, header: Arc<BufferHeader>) {
        self.inner.push_header(header);
    }

    /// Returns `true` if `buffer` recycles into this queue.
    pub(crate) fn is_home_of(&self, buffer: &Buffer) -> bool {
        Weak::ptr_eq(buffer.home(), &Arc::downgrade(&self.inner))
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Queue")
            .field("len", &state.items.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = Queue::new();
        for len in 1..=3 {
            let mut buffer = Buffer::allocate(4);
            buffer.write_payload(&vec![0; len]);
            queue.put(buffer);
        }
        assert_eq!(queue.len(), 3);
        let lengths: Vec<usize> = (0..3)
            .map(|_| queue.get().unwrap().unwrap().length())
            .collect();
        assert_eq!(lengths, vec![1, 2, 3]);
        assert!(queue.get().unwrap().is_none());
    }

    #[test]
    fn wait_wakes_on_put() {
        let queue = Queue::new();
        let producer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.put(Buffer::allocate(1));
        });
        let buffer = queue.wait().unwrap();
        assert_eq!(buffer.capacity(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn timed_wait_returns_none_when_empty() {
        let queue = Queue::new();
        assert!(
            queue
                .timed_wait(Duration::from_millis(10))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn destroyed_queue_rejects_retrieval() {
        let queue = Queue::new();
        queue.put(Buffer::allocate(1));
        queue.destroy();
        assert!(matches!(queue.get(), Err(Error::QueueDestroyed)));
        assert!(matches!(queue.wait(), Err(Error::QueueDestroyed)));
        queue.put(Buffer::allocate(1));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn destroy_wakes_waiters() {
        let queue = Queue::new();
        let waiter = queue.clone();
        let handle = thread::spawn(move || waiter.wait().map(|_| ()));
        thread::sleep(Duration::from_millis(20));
        queue.destroy();
        assert!(matches!(handle.join().unwrap(), Err(Error::QueueDestroyed)));
    }
}
