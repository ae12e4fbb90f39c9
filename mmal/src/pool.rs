// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size sets of buffer headers.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    Error, Result,
    buffer::{Buffer, BufferHeader},
    queue::Queue,
};

struct PoolInner {
    name: String,
    queue: Queue,
    /// Header count and per-header capacity.
    dims: Mutex<(u32, usize)>,
}

/// A pool of buffer headers with an associated queue.
///
/// All headers sit in the pool's queue while idle. A header is "checked out"
/// between the moment it is taken from the queue and the moment its last
/// handle is released. Resizing and destroying require every header to be
/// back in the queue.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates a pool of `headers` buffers of `buffer_size` bytes each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPool`] if either dimension is zero.
    pub fn new(name: impl Into<String>, headers: u32, buffer_size: usize) -> Result<Self> {
        let name = name.into();
        if headers == 0 || buffer_size == 0 {
            return Err(Error::MissingPool(name));
        }
        let queue = Queue::new();
        populate(&queue, headers, buffer_size);
        debug!("Pool {name}: created {headers} header(s) of {buffer_size} byte(s).");
        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                queue,
                dims: Mutex::new((headers, buffer_size)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The queue holding the idle headers.
    pub fn queue(&self) -> &Queue {
        &self.inner.queue
    }

    pub fn header_count(&self) -> u32 {
        self.inner.dims.lock().0
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.dims.lock().1
    }

    /// Number of headers currently checked out.
    pub fn outstanding(&self) -> u32 {
        let idle = u32::try_from(self.inner.queue.len()).unwrap_or(u32::MAX);
        self.header_count().saturating_sub(idle)
    }

    /// Returns `true` if `buffer` was allocated by this pool.
    pub fn owns(&self, buffer: &Buffer) -> bool {
        self.inner.queue.is_home_of(buffer)
    }

    /// Reallocates the pool with new dimensions.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolNotDrained`] if buffers are checked out
    /// - [`Error::InvalidArg`] if either dimension is zero
    pub fn resize(&self, headers: u32, buffer_size: usize) -> Result<()> {
        if headers == 0 || buffer_size == 0 {
            return Err(Error::InvalidArg(format!(
                "Pool {}: cannot resize to {headers} x {buffer_size}",
                self.inner.name
            )));
        }
        self.ensure_drained()?;
        let mut dims = self.inner.dims.lock();
        for buffer in self.inner.queue.take_all() {
            buffer.forget();
        }
        populate(&self.inner.queue, headers, buffer_size);
        *dims = (headers, buffer_size);
        debug!(
            "Pool {}: resized to {headers} header(s) of {buffer_size} byte(s).",
            self.inner.name
        );
        Ok(())
    }

    /// Waits until every header is back in the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolNotDrained`] if `timeout` elapses first.
    pub fn drain(&self, timeout: Duration) -> Result<()> {
        if self.wait_drained(timeout)? {
            Ok(())
        } else {
            Err(self.not_drained())
        }
    }

    /// Waits at most `timeout` for every header to be back in the queue and
    /// returns whether they are.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> Result<bool> {
        let target = self.header_count() as usize;
        self.inner
            .queue
            .wait_for_len(target, Instant::now() + timeout)
    }

    /// Frees every header and destroys the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolNotDrained`] if buffers are checked out; the pool
    /// is left intact in that case.
    pub fn destroy(&self) -> Result<()> {
        self.ensure_drained()?;
        for buffer in self.inner.queue.take_all() {
            buffer.forget();
        }
        self.inner.queue.destroy();
        debug!("Pool {}: destroyed.", self.inner.name);
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.queue.is_destroyed()
    }

    fn ensure_drained(&self) -> Result<()> {
        if self.outstanding() > 0 {
            Err(self.not_drained())
        } else {
            Ok(())
        }
    }

    pub(crate) fn not_drained(&self) -> Error {
        Error::PoolNotDrained {
            name: self.inner.name.clone(),
            headers: self.header_count(),
            outstanding: self.outstanding(),
        }
    }
}

fn populate(queue: &Queue, headers: u32, buffer_size: usize) {
    for _ in 0..headers {
        queue.push_header(BufferHeader::new(buffer_size, queue.downgrade()));
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if self.queue.is_destroyed() {
            return;
        }
        let headers = self.dims.lock().0 as usize;
        let idle = self.queue.len();
        if idle < headers {
            warn!(
                "Pool {}: dropped with {} buffer(s) still checked out.",
                self.name,
                headers - idle
            );
        }
        self.queue.destroy();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("headers", &self.header_count())
            .field("buffer_size", &self.buffer_size())
            .field("idle", &self.inner.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_return_to_the_pool() {
        let pool = Pool::new("test", 3, 16).unwrap();
        let buffer = pool.queue().get().unwrap().unwrap();
        assert!(pool.owns(&buffer));
        assert_eq!(pool.outstanding(), 1);

        let extra = buffer.acquire();
        buffer.release();
        assert_eq!(pool.outstanding(), 1);
        extra.release();
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.queue().len(), 3);
    }

    #[test]
    fn recycled_buffers_are_reset() {
        let pool = Pool::new("test", 1, 8).unwrap();
        let mut buffer = pool.queue().get().unwrap().unwrap();
        buffer.read_into(b"payload", true).unwrap();
        drop(buffer);
        let buffer = pool.queue().get().unwrap().unwrap();
        assert_eq!(buffer.length(), 0);
        assert!(buffer.flags().is_empty());
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(Pool::new("p", 0, 8), Err(Error::MissingPool(_))));
        assert!(matches!(Pool::new("p", 2, 0), Err(Error::MissingPool(_))));
    }

    #[test]
    fn resize_requires_every_buffer_home() {
        let pool = Pool::new("test", 2, 8).unwrap();
        let held = pool.queue().get().unwrap().unwrap();
        assert!(matches!(
            pool.resize(4, 32),
            Err(Error::PoolNotDrained { outstanding: 1, .. })
        ));
        drop(held);
        pool.resize(4, 32).unwrap();
        assert_eq!(pool.header_count(), 4);
        assert_eq!(pool.queue().len(), 4);
        assert_eq!(pool.queue().get().unwrap().unwrap().capacity(), 32);
    }

    #[test]
    fn drain_times_out_with_outstanding_buffers() {
        let pool = Pool::new("test", 2, 8).unwrap();
        let held = pool.queue().get().unwrap().unwrap();
        assert!(matches!(
            pool.drain(Duration::from_millis(10)),
            Err(Error::PoolNotDrained { .. })
        ));
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            held.release();
        });
        pool.drain(Duration::from_secs(2)).unwrap();
        releaser.join().unwrap();
    }

    #[test]
    fn destroy_refuses_while_buffers_are_out() {
        let pool = Pool::new("test", 2, 8).unwrap();
        let held = pool.queue().get().unwrap().unwrap();
        assert!(pool.destroy().is_err());
        assert!(!pool.is_destroyed());
        held.release();
        pool.destroy().unwrap();
        assert!(pool.is_destroyed());
        assert!(matches!(pool.queue().get(), Err(Error::QueueDestroyed)));
    }
}
