// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Recyclable buffer headers and the owned [`Buffer`] handle.
//!
//! A buffer header is a fixed-capacity block of memory plus metadata (length,
//! offset, flags, timestamps, command code). Headers are allocated once by a
//! [`crate::Pool`] and move between queues, ports and the native layer as
//! [`Buffer`] handles. Each handle accounts for one reference; dropping or
//! releasing the last one returns the header to the queue of the pool it was
//! allocated from.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
    sync::{
        Arc, Weak,
        atomic::{AtomicU32, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::trace;

use crate::{Error, Result, queue::QueueInner};

/// Flag word carried by a buffer header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    pub const END_OF_STREAM: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_EOS);
    pub const FRAME_START: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_FRAME_START);
    pub const FRAME_END: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_FRAME_END);
    pub const KEYFRAME: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_KEYFRAME);
    pub const DISCONTINUITY: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_DISCONTINUITY);
    pub const CONFIG: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_CONFIG);
    pub const CORRUPTED: Self = Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_CORRUPTED);
    pub const TRANSMISSION_FAILED: Self =
        Self(mmal_sys::MMAL_BUFFER_HEADER_FLAG_TRANSMISSION_FAILED);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Classification of an event buffer (command code > 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Error,
    EndOfStream,
    FormatChanged,
    ParameterChanged,
    Other(u32),
}

impl EventKind {
    /// Classifies a command code; `None` for data buffers (command 0).
    pub fn from_command(command: u32) -> Option<Self> {
        match command {
            0 => None,
            mmal_sys::MMAL_EVENT_ERROR => Some(Self::Error),
            mmal_sys::MMAL_EVENT_EOS => Some(Self::EndOfStream),
            mmal_sys::MMAL_EVENT_FORMAT_CHANGED => Some(Self::FormatChanged),
            mmal_sys::MMAL_EVENT_PARAMETER_CHANGED => Some(Self::ParameterChanged),
            other => Some(Self::Other(other)),
        }
    }
}

struct HeaderState {
    data: Box<[u8]>,
    length: usize,
    offset: usize,
    flags: BufferFlags,
    pts: i64,
    dts: i64,
    command: u32,
}

impl HeaderState {
    fn reset(&mut self) {
        self.length = 0;
        self.offset = 0;
        self.flags = BufferFlags::NONE;
        self.pts = mmal_sys::MMAL_TIME_UNKNOWN;
        self.dts = mmal_sys::MMAL_TIME_UNKNOWN;
        self.command = 0;
    }
}

/// Shared storage behind one or more [`Buffer`] handles.
pub(crate) struct BufferHeader {
    capacity: usize,
    refs: AtomicU32,
    state: Mutex<HeaderState>,
    home: Weak<QueueInner>,
}

impl BufferHeader {
    pub(crate) fn new(capacity: usize, home: Weak<QueueInner>) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            refs: AtomicU32::new(0),
            state: Mutex::new(HeaderState {
                data: vec![0; capacity].into_boxed_slice(),
                length: 0,
                offset: 0,
                flags: BufferFlags::NONE,
                pts: mmal_sys::MMAL_TIME_UNKNOWN,
                dts: mmal_sys::MMAL_TIME_UNKNOWN,
                command: 0,
            }),
            home,
        })
    }

    /// Wraps the header into a fresh handle holding the only reference.
    pub(crate) fn into_buffer(self: Arc<Self>) -> Buffer {
        self.refs.store(1, Ordering::Release);
        Buffer {
            header: self,
            released: false,
        }
    }
}

/// Owned handle to a buffer header.
///
/// The handle must be released exactly once: either explicitly through
/// [`Buffer::release`], by handing it to another owner (a queue, a port, the
/// native layer), or implicitly when it is dropped. Release consumes the
/// handle, so use after release does not compile.
///
/// Additional logical holders are created with [`Buffer::acquire`]; the header
/// returns to its pool once the last handle is released.
pub struct Buffer {
    header: Arc<BufferHeader>,
    released: bool,
}

impl Buffer {
    /// Allocates a standalone buffer that belongs to no pool.
    ///
    /// Releasing the last handle frees the memory instead of recycling it.
    pub fn allocate(capacity: usize) -> Self {
        BufferHeader::new(capacity, Weak::new()).into_buffer()
    }

    pub fn capacity(&self) -> usize {
        self.header.capacity
    }

    /// Number of payload bytes, starting at [`Self::offset`].
    pub fn length(&self) -> usize {
        self.header.state.lock().length
    }

    pub fn offset(&self) -> usize {
        self.header.state.lock().offset
    }

    pub fn flags(&self) -> BufferFlags {
        self.header.state.lock().flags
    }

    /// Returns `true` if all bits of `flags` are set on this buffer.
    pub fn has_flags(&self, flags: BufferFlags) -> bool {
        self.flags().contains(flags)
    }

    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.header.state.lock().flags = flags;
    }

    /// Command code: 0 for data, an event code otherwise.
    pub fn command(&self) -> u32 {
        self.header.state.lock().command
    }

    pub fn set_command(&mut self, command: u32) {
        self.header.state.lock().command = command;
    }

    pub fn is_event(&self) -> bool {
        self.command() != 0
    }

    pub fn event(&self) -> Option<EventKind> {
        EventKind::from_command(self.command())
    }

    /// Presentation timestamp in microseconds, or `MMAL_TIME_UNKNOWN`.
    pub fn pts(&self) -> i64 {
        self.header.state.lock().pts
    }

    /// Decode timestamp in microseconds, or `MMAL_TIME_UNKNOWN`.
    pub fn dts(&self) -> i64 {
        self.header.state.lock().dts
    }

    pub fn set_timestamps(&mut self, pts: i64, dts: i64) {
        let mut state = self.header.state.lock();
        state.pts = pts;
        state.dts = dts;
    }

    /// Runs `f` over the valid payload bytes.
    ///
    /// The header stays locked while `f` runs, so `f` must not block.
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let state = self.header.state.lock();
        let start = state.offset;
        f(&state.data[start..start + state.length])
    }

    /// Copies the valid payload bytes out of the buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.with_payload(<[u8]>::to_vec)
    }

    /// Copies as much of `source` as fits into the buffer.
    ///
    /// Sets the offset to zero and the length to the number of bytes copied,
    /// which is returned. Flags and timestamps are left untouched.
    pub fn write_payload(&mut self, source: &[u8]) -> usize {
        let mut state = self.header.state.lock();
        let written = source.len().min(self.header.capacity);
        state.data[..written].copy_from_slice(&source[..written]);
        state.offset = 0;
        state.length = written;
        written
    }

    /// Loads a complete payload supplied by the application.
    ///
    /// Timestamps are set to unknown and the end-of-stream flag is set when
    /// `eos` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `source` does not fit.
    pub fn read_into(&mut self, source: &[u8], eos: bool) -> Result<()> {
        if source.len() > self.header.capacity {
            return Err(Error::InvalidArg(format!(
                "payload of {} byte(s) exceeds buffer capacity {}",
                source.len(),
                self.header.capacity
            )));
        }
        self.write_payload(source);
        let mut state = self.header.state.lock();
        state.pts = mmal_sys::MMAL_TIME_UNKNOWN;
        state.dts = mmal_sys::MMAL_TIME_UNKNOWN;
        state.flags = if eos {
            BufferFlags::END_OF_STREAM
        } else {
            BufferFlags::NONE
        };
        Ok(())
    }

    /// Clears length, offset, flags, timestamps and command code.
    pub fn reset(&mut self) {
        self.header.state.lock().reset();
    }

    /// Adds a logical holder and returns its handle.
    pub fn acquire(&self) -> Buffer {
        self.header.refs.fetch_add(1, Ordering::AcqRel);
        Buffer {
            header: self.header.clone(),
            released: false,
        }
    }

    /// Drops this holder's reference.
    ///
    /// When it was the last one, the header is reset and put back into the
    /// queue of the pool that allocated it.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Number of live handles on this header.
    pub fn ref_count(&self) -> u32 {
        self.header.refs.load(Ordering::Acquire)
    }

    pub(crate) fn home(&self) -> &Weak<QueueInner> {
        &self.header.home
    }

    /// Invalidates the handle without recycling the header, freeing it.
    pub(crate) fn forget(mut self) {
        self.released = true;
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.header.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            recycle(self.header.clone());
        }
    }
}

fn recycle(header: Arc<BufferHeader>) {
    header.state.lock().reset();
    match header.home.upgrade() {
        Some(queue) => queue.push_header(header),
        None => trace!("Buffer header has no pool to return to, freeing."),
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.header.state.lock();
        f.debug_struct("Buffer")
            .field("capacity", &self.header.capacity)
            .field("length", &state.length)
            .field("offset", &state.offset)
            .field("flags", &format_args!("{:#x}", state.flags.bits()))
            .field("pts", &state.pts)
            .field("command", &state.command)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_into_sets_eos_and_rejects_oversize() {
        let mut buffer = Buffer::allocate(8);
        buffer.read_into(b"abc", true).unwrap();
        assert_eq!(buffer.length(), 3);
        assert!(buffer.has_flags(BufferFlags::END_OF_STREAM));
        assert_eq!(buffer.pts(), mmal_sys::MMAL_TIME_UNKNOWN);
        assert_eq!(buffer.to_vec(), b"abc");

        assert!(matches!(
            buffer.read_into(&[0; 9], false),
            Err(Error::InvalidArg(_))
        ));
    }

    #[test]
    fn reset_clears_metadata() {
        let mut buffer = Buffer::allocate(4);
        buffer.write_payload(b"data");
        buffer.set_flags(BufferFlags::FRAME_END | BufferFlags::KEYFRAME);
        buffer.set_command(mmal_sys::MMAL_EVENT_EOS);
        buffer.set_timestamps(10, 5);
        buffer.reset();
        assert_eq!(buffer.length(), 0);
        assert!(buffer.flags().is_empty());
        assert!(!buffer.is_event());
        assert_eq!(buffer.dts(), mmal_sys::MMAL_TIME_UNKNOWN);
    }

    #[test]
    fn acquire_counts_holders() {
        let buffer = Buffer::allocate(4);
        let second = buffer.acquire();
        assert_eq!(buffer.ref_count(), 2);
        second.release();
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn write_payload_truncates_to_capacity() {
        let mut buffer = Buffer::allocate(2);
        assert_eq!(buffer.write_payload(b"xyz"), 2);
        assert_eq!(buffer.to_vec(), b"xy");
    }

    #[test]
    fn events_are_classified() {
        assert_eq!(EventKind::from_command(0), None);
        assert_eq!(
            EventKind::from_command(mmal_sys::MMAL_EVENT_FORMAT_CHANGED),
            Some(EventKind::FormatChanged)
        );
        assert_eq!(EventKind::from_command(7), Some(EventKind::Other(7)));
    }
}
