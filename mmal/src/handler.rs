// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Consumers of the payload flowing through a pipeline.

use parking_lot::Mutex;
use tracing::debug;

use crate::trigger::Completion;

/// Receives the payload delivered on an output port.
///
/// Called from the native callback thread of the port: implementations must
/// not block for long.
pub trait CaptureHandler: Send + Sync {
    /// Called once per delivered buffer, before the buffer is released.
    fn on_data_available(&self, data: &[u8], end_of_frame: bool);

    /// Called once when the port's operation finishes.
    fn on_stream_end(&self, _completion: Completion) {}
}

impl<F> CaptureHandler for F
where
    F: Fn(&[u8], bool) + Send + Sync,
{
    fn on_data_available(&self, data: &[u8], end_of_frame: bool) {
        self(data, end_of_frame)
    }
}

/// Observes data crossing a callback-driven connection.
pub trait ConnectionListener: Send + Sync {
    /// Payload produced upstream, about to be sent to the downstream input.
    fn on_input(&self, data: &[u8]);

    /// A buffer returned from the downstream input, about to be sent back to
    /// the upstream output to be filled again.
    fn on_output(&self, _data: &[u8]) {}
}

type FrameCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Default)]
struct Collected {
    data: Vec<u8>,
    frame: Vec<u8>,
    frames: usize,
}

/// A handler that accumulates the stream in memory.
///
/// Optional callbacks observe every chunk (`on_video_data`) and every complete
/// frame (`on_full_frame`). A frame completes on end-of-frame, or when the
/// stream ends with a partial frame pending.
#[derive(Default)]
pub struct InMemoryHandler {
    collected: Mutex<Collected>,
    on_video_data: Option<FrameCallback>,
    on_full_frame: Option<FrameCallback>,
}

impl InMemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_video_data(mut self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.on_video_data = Some(Box::new(callback));
        self
    }

    pub fn on_full_frame(mut self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.on_full_frame = Some(Box::new(callback));
        self
    }

    /// Copy of everything received so far.
    pub fn data(&self) -> Vec<u8> {
        self.collected.lock().data.clone()
    }

    /// Takes everything received so far, leaving the handler empty.
    pub fn take_data(&self) -> Vec<u8> {
        std::mem::take(&mut self.collected.lock().data)
    }

    /// Number of complete frames seen.
    pub fn frames(&self) -> usize {
        self.collected.lock().frames
    }

    fn complete_frame(&self, frame: Vec<u8>) {
        if let Some(callback) = &self.on_full_frame {
            callback(&frame);
        }
    }
}

impl CaptureHandler for InMemoryHandler {
    fn on_data_available(&self, data: &[u8], end_of_frame: bool) {
        let finished = {
            let mut collected = self.collected.lock();
            collected.data.extend_from_slice(data);
            collected.frame.extend_from_slice(data);
            if end_of_frame {
                collected.frames += 1;
                Some(std::mem::take(&mut collected.frame))
            } else {
                None
            }
        };
        if let Some(callback) = &self.on_video_data {
            callback(data);
        }
        if let Some(frame) = finished {
            self.complete_frame(frame);
        }
    }

    fn on_stream_end(&self, completion: Completion) {
        let pending = {
            let mut collected = self.collected.lock();
            if collected.frame.is_empty() {
                None
            } else {
                collected.frames += 1;
                Some(std::mem::take(&mut collected.frame))
            }
        };
        debug!("In-memory handler: stream ended ({completion}).");
        if let Some(frame) = pending {
            self.complete_frame(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn frames_complete_on_end_of_frame_and_stream_end() {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let seen = sizes.clone();
        let handler = InMemoryHandler::new().on_full_frame(move |frame| seen.lock().push(frame.len()));

        handler.on_data_available(b"ab", false);
        handler.on_data_available(b"c", true);
        handler.on_data_available(b"de", false);
        handler.on_stream_end(Completion::EndOfStream);

        assert_eq!(handler.frames(), 2);
        assert_eq!(*sizes.lock(), vec![3, 2]);
        assert_eq!(handler.take_data(), b"abcde");
        assert!(handler.data().is_empty());
    }

    #[test]
    fn closures_are_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler: Arc<dyn CaptureHandler> = Arc::new(move |data: &[u8], _eof: bool| {
            counter.fetch_add(data.len(), Ordering::SeqCst);
        });
        handler.on_data_available(b"1234", false);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
