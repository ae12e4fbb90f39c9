// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Ports: the typed endpoints of a component.
//!
//! A [`Port`] owns the negotiated format of one endpoint, its enable state and,
//! while enabled, a [`Pool`] of buffers sized from that format. Output ports
//! hand every pool buffer to the native layer on enable and keep it supplied
//! from the native callback: each returned buffer is dispatched to the capture
//! handler, released, and replaced with a fresh one until a terminal condition
//! resolves the port's [`Trigger`].

mod format;

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use mmal_sys::Rational;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

pub use format::{CaptureMode, Crop, Encoding, PortConfig, PortFormat, align_up, pad_height, pad_width};

use crate::{
    Error, Result,
    buffer::{Buffer, BufferFlags, EventKind},
    handler::CaptureHandler,
    native::{BufferHandler, ParameterValue, PortDirection, PortHandle, PortInfo},
    pipeline::PipelineContext,
    pool::Pool,
    trigger::{Completion, Trigger},
};

/// Longest single wait of a draining port between two checks.
const DRAIN_SLICE: Duration = Duration::from_millis(20);

/// Enable state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PortState::Disabled => "disabled",
            PortState::Enabling => "enabling",
            PortState::Enabled => "enabled",
            PortState::Disabling => "disabling",
        };
        f.write_str(text)
    }
}

/// The processing operation currently running on a port.
#[derive(Clone)]
struct Operation {
    trigger: Trigger,
    deadline: Option<Instant>,
}

struct PortInner {
    id: Uuid,
    handle: PortHandle,
    name: String,
    direction: PortDirection,
    index: usize,
    component_id: Uuid,
    context: Arc<PipelineContext>,
    force_stop: Arc<AtomicBool>,
    state: Mutex<PortState>,
    format: Mutex<PortFormat>,
    config: Mutex<PortConfig>,
    pool: Mutex<Option<Pool>>,
    connection: Mutex<Option<Uuid>>,
    handler: Mutex<Option<Arc<dyn CaptureHandler>>>,
    operation: Mutex<Option<Operation>>,
}

/// One endpoint of a component.
///
/// `Port` is a cheap handle; clones refer to the same endpoint.
#[derive(Clone)]
pub struct Port {
    inner: Arc<PortInner>,
}

/// Adapter registered with the native layer; holds the port weakly so a
/// late callback after teardown is a no-op.
struct PortCallback {
    port: Weak<PortInner>,
}

impl BufferHandler for PortCallback {
    fn on_buffer(&self, buffer: Buffer) {
        let Some(inner) = self.port.upgrade() else {
            trace!("Buffer returned to a dropped port, releasing.");
            return;
        };
        let port = Port { inner };
        match port.direction() {
            PortDirection::Output | PortDirection::Control => port.on_output_buffer(buffer),
            PortDirection::Input => port.on_input_buffer(buffer),
        }
    }
}

impl Port {
    pub(crate) fn new(
        info: PortInfo,
        component_id: Uuid,
        context: Arc<PipelineContext>,
        force_stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(PortInner {
                id: Uuid::new_v4(),
                handle: info.handle,
                name: info.name,
                direction: info.direction,
                index: info.index,
                component_id,
                context,
                force_stop,
                state: Mutex::new(PortState::Disabled),
                format: Mutex::new(info.format),
                config: Mutex::new(PortConfig::default()),
                pool: Mutex::new(None),
                connection: Mutex::new(None),
                handler: Mutex::new(None),
                operation: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn direction(&self) -> PortDirection {
        self.inner.direction
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Id of the component owning this port.
    pub fn component_id(&self) -> Uuid {
        self.inner.component_id
    }

    pub(crate) fn handle(&self) -> PortHandle {
        self.inner.handle
    }

    pub fn state(&self) -> PortState {
        *self.inner.state.lock()
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == PortState::Enabled
    }

    /// The last committed format.
    pub fn format(&self) -> PortFormat {
        self.inner.format.lock().clone()
    }

    /// The configuration last applied with [`Port::configure`].
    pub fn config(&self) -> PortConfig {
        self.inner.config.lock().clone()
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.inner.config.lock().capture_mode
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.config.lock().timeout()
    }

    /// Sets the timeout applied to the next operation started on this port.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.config.lock().timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
    }

    /// The pool backing this port while it is enabled.
    pub fn pool(&self) -> Option<Pool> {
        self.inner.pool.lock().clone()
    }

    /// Trigger of the running operation, if any.
    pub fn trigger(&self) -> Option<Trigger> {
        self.inner
            .operation
            .lock()
            .as_ref()
            .map(|op| op.trigger.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.lock().is_some()
    }

    /// Id of the connection attached to this port.
    pub fn connection_id(&self) -> Option<Uuid> {
        *self.inner.connection.lock()
    }

    pub(crate) fn attach_connection(&self, connection: Uuid) -> Result<()> {
        let mut current = self.inner.connection.lock();
        if current.is_some() {
            return Err(Error::AlreadyConnected(self.inner.name.clone()));
        }
        *current = Some(connection);
        Ok(())
    }

    pub(crate) fn detach_connection(&self) {
        self.inner.connection.lock().take();
    }

    /// Registers the consumer of the payload delivered on this port.
    pub fn set_capture_handler(&self, handler: Arc<dyn CaptureHandler>) {
        *self.inner.handler.lock() = Some(handler);
    }

    pub fn has_capture_handler(&self) -> bool {
        self.inner.handler.lock().is_some()
    }

    fn capture_handler(&self) -> Option<Arc<dyn CaptureHandler>> {
        self.inner.handler.lock().clone()
    }

    fn force_stop_requested(&self) -> bool {
        self.inner.force_stop.load(Ordering::Acquire)
    }

    /// Commits the current format again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Native`] if the native layer rejects the format.
    pub fn commit(&self) -> Result<()> {
        let mut format = self.format();
        self.commit_format(&mut format)
    }

    fn commit_format(&self, format: &mut PortFormat) -> Result<()> {
        let status = self
            .inner
            .context
            .native
            .commit_format(self.inner.handle, format);
        Error::from_status(status, format!("{}: commit format", self.inner.name))?;
        *self.inner.format.lock() = format.clone();
        Ok(())
    }

    /// Applies a requested configuration and negotiates buffer requirements.
    ///
    /// The resolution is padded (width to 32, height to 16) and the crop
    /// defaults to the unpadded frame. After a first commit, the buffer count
    /// and size are set to the requested values, or the native recommendation
    /// when zero, and never below the native minimum; then the format is
    /// committed again.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the port is disabled
    /// - [`Error::InvalidArg`] if the padded resolution overflows
    /// - [`Error::Native`] if a commit fails; the previous format is restored
    ///   first
    pub fn configure(&self, config: PortConfig) -> Result<PortFormat> {
        let state = self.state();
        if state != PortState::Disabled {
            return Err(self.invalid_state("configure", state));
        }

        let previous = self.format();
        let mut format = previous.clone();
        format.encoding = config.encoding;
        if let Some(pixel_format) = config.pixel_format {
            format.encoding_variant = pixel_format;
        }
        if config.width > 0 && config.height > 0 {
            let (Some(width), Some(height)) = (pad_width(config.width), pad_height(config.height))
            else {
                return Err(Error::InvalidArg(format!(
                    "{}: resolution {}x{} cannot be padded",
                    self.inner.name, config.width, config.height
                )));
            };
            format.width = width;
            format.height = height;
            format.crop = config.crop.unwrap_or(Crop {
                x: 0,
                y: 0,
                width: config.width,
                height: config.height,
            });
        } else if let Some(crop) = config.crop {
            format.crop = crop;
        }
        if let Some((num, den)) = config.framerate {
            format.framerate = Rational::new(num, den);
        }
        if config.bitrate > 0 {
            format.bitrate = config.bitrate;
        }

        if let Err(err) = self.commit_format(&mut format) {
            let mut restored = previous;
            if let Err(restore_err) = self.commit_format(&mut restored) {
                error!(
                    "{}: failed to restore previous format: {restore_err}",
                    self.inner.name
                );
            }
            return Err(err);
        }

        if config.zero_copy {
            self.set_parameter(mmal_sys::MMAL_PARAMETER_ZERO_COPY, ParameterValue::Bool(true))?;
        }
        if config.quality > 0 {
            self.set_parameter(
                mmal_sys::MMAL_PARAMETER_CAPTURE_QUALITY,
                ParameterValue::U32(config.quality),
            )?;
        }

        format.buffer_num = format::negotiate(
            config.buffer_num,
            format.buffer_num_recommended,
            format.buffer_num_min,
        );
        format.buffer_size = format::negotiate(
            config.buffer_size,
            format.buffer_size_recommended,
            format.buffer_size_min,
        );
        self.commit_format(&mut format)?;

        debug!(
            "{}: configured {} {}x{}, {} buffer(s) of {} byte(s).",
            self.inner.name,
            format.encoding,
            format.width,
            format.height,
            format.buffer_num,
            format.buffer_size
        );
        *self.inner.config.lock() = config;
        Ok(format)
    }

    /// Copies an upstream port's format onto this one and commits it.
    pub(crate) fn adopt_format(&self, upstream: &PortFormat) -> Result<()> {
        let state = self.state();
        if state != PortState::Disabled {
            return Err(self.invalid_state("adopt a format", state));
        }
        let mut format = upstream.clone();
        self.commit_format(&mut format)
    }

    /// Sets an opaque parameter on this port.
    pub fn set_parameter(&self, id: u32, value: ParameterValue) -> Result<()> {
        let status = self
            .inner
            .context
            .native
            .set_parameter(self.inner.handle, id, &value);
        Error::from_status(
            status,
            format!("{}: set parameter {id:#x}", self.inner.name),
        )
    }

    /// Reads an opaque parameter from this port.
    pub fn get_parameter(&self, id: u32) -> Result<ParameterValue> {
        self.inner
            .context
            .native
            .get_parameter(self.inner.handle, id)
            .map_err(|status| Error::Native {
                operation: format!("{}: get parameter {id:#x}", self.inner.name),
                status,
            })
    }

    /// Starts a processing operation: arms a fresh trigger, computes the
    /// deadline from the configured timeout and enables the port.
    ///
    /// # Returns
    ///
    /// The trigger resolved when the operation ends.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the port is disabled
    /// - any error of [`Port::enable`]
    pub fn start(&self) -> Result<Trigger> {
        let state = self.state();
        if state != PortState::Disabled {
            return Err(self.invalid_state("start", state));
        }
        let trigger = Trigger::new(self.inner.name.clone());
        let deadline = self.timeout().map(|timeout| Instant::now() + timeout);
        *self.inner.operation.lock() = Some(Operation {
            trigger: trigger.clone(),
            deadline,
        });
        if let Err(err) = self.enable() {
            self.inner.operation.lock().take();
            return Err(err);
        }
        Ok(trigger)
    }

    /// Enables the port.
    ///
    /// Creates the pool from the committed format, registers the callback
    /// with the native layer and, for output ports, sends every pool buffer
    /// so the native layer has work queued before capture starts. Enabling an
    /// enabled port does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the port is mid-transition or connected
    /// - [`Error::MissingPool`] if the format asks for zero buffers
    /// - [`Error::Native`] if the native layer refuses
    pub fn enable(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                PortState::Enabled => return Ok(()),
                PortState::Disabled => {}
                other => return Err(self.invalid_state("enable", other)),
            }
            if self.is_connected() {
                return Err(Error::InvalidState {
                    object: self.inner.name.clone(),
                    action: "enable",
                    state: "connected".to_string(),
                });
            }
            *state = PortState::Enabling;
        }

        match self.enable_inner() {
            Ok(()) => {
                *self.inner.state.lock() = PortState::Enabled;
                debug!("{}: enabled.", self.inner.name);
                Ok(())
            }
            Err(err) => {
                *self.inner.state.lock() = PortState::Disabled;
                Err(err)
            }
        }
    }

    fn enable_inner(&self) -> Result<()> {
        let native = &self.inner.context.native;
        let callback: Arc<dyn BufferHandler> = Arc::new(PortCallback {
            port: Arc::downgrade(&self.inner),
        });

        if self.inner.direction == PortDirection::Control {
            let status = native.enable_port(self.inner.handle, Some(callback));
            return Error::from_status(status, format!("{}: enable port", self.inner.name));
        }

        let format = self.format();
        let pool = Pool::new(self.inner.name.clone(), format.buffer_num, format.buffer_size)
            .map_err(|_| Error::MissingPool(self.inner.name.clone()))?;
        *self.inner.pool.lock() = Some(pool.clone());

        let status = native.enable_port(self.inner.handle, Some(callback));
        if let Err(err) = Error::from_status(status, format!("{}: enable port", self.inner.name)) {
            self.inner.pool.lock().take();
            return Err(err);
        }

        if self.inner.direction == PortDirection::Output
            && let Err(err) = self.send_all_buffers(&pool)
        {
            native.disable_port(self.inner.handle);
            if let Err(drain_err) = self.drain_pool() {
                warn!("{}: {drain_err}", self.inner.name);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Disables the port and disposes of its pool once every buffer is back.
    ///
    /// Disabling a disabled port does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the port is mid-transition
    /// - [`Error::Native`] if the native layer refuses
    /// - [`Error::PoolNotDrained`] if buffers did not return within the drain
    ///   timeout; the pool is kept and can be cleaned later
    pub fn disable(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                PortState::Disabled => return Ok(()),
                PortState::Enabled => *state = PortState::Disabling,
                other => return Err(self.invalid_state("disable", other)),
            }
        }

        let status = self.inner.context.native.disable_port(self.inner.handle);
        let result = Error::from_status(status, format!("{}: disable port", self.inner.name))
            .and_then(|()| self.drain_pool());
        *self.inner.state.lock() = PortState::Disabled;
        if result.is_ok() {
            debug!("{}: disabled.", self.inner.name);
        }
        result
    }

    /// Waits for every pool buffer to return, then destroys the pool.
    ///
    /// The pipeline pool lock is taken for each check only, so callbacks of
    /// other ports can replenish while this port drains.
    fn drain_pool(&self) -> Result<()> {
        let Some(pool) = self.inner.pool.lock().take() else {
            return Ok(());
        };
        let context = &self.inner.context;
        let lock = match self.inner.direction {
            PortDirection::Input => &context.input_lock,
            _ => &context.output_lock,
        };
        let deadline = Instant::now() + context.config.drain_timeout();
        loop {
            {
                let _guard = lock.lock();
                if pool.outstanding() == 0 {
                    return pool.destroy();
                }
            }
            let now = Instant::now();
            if now >= deadline {
                let err = pool.not_drained();
                warn!("{}: pool not drained: {err}", self.inner.name);
                *self.inner.pool.lock() = Some(pool);
                return Err(err);
            }
            pool.wait_drained((deadline - now).min(DRAIN_SLICE))?;
        }
    }

    /// Destroys a pool left behind by a failed disable.
    pub fn clean_pool(&self) -> Result<()> {
        if self.state() != PortState::Disabled {
            return Ok(());
        }
        let Some(pool) = self.inner.pool.lock().take() else {
            return Ok(());
        };
        if let Err(err) = pool.destroy() {
            *self.inner.pool.lock() = Some(pool);
            return Err(err);
        }
        Ok(())
    }

    /// Hands a buffer to the native layer for this port.
    pub fn send_buffer(&self, buffer: Buffer) -> Result<()> {
        let status = self
            .inner
            .context
            .native
            .send_buffer(self.inner.handle, buffer);
        Error::from_status(status, format!("{}: send buffer", self.inner.name))
    }

    /// Sends every buffer currently idle in `pool` to this port.
    pub fn send_all_buffers(&self, pool: &Pool) -> Result<()> {
        let _guard = self.inner.context.output_lock.lock();
        let mut sent = 0;
        while let Some(buffer) = pool.queue().get()? {
            self.send_buffer(buffer)?;
            sent += 1;
        }
        trace!("{}: sent {sent} buffer(s).", self.inner.name);
        Ok(())
    }

    /// Feeds application data into an enabled input port.
    ///
    /// The data is split over as many pool buffers as needed; the last one
    /// carries the end-of-stream flag when `eos` is set. Each buffer is taken
    /// from the pool with a bounded wait.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArg`] for a non-input port
    /// - [`Error::InvalidState`] if the port is not enabled
    /// - [`Error::Timeout`] if no buffer became available in time
    pub fn feed(&self, data: &[u8], eos: bool) -> Result<()> {
        if self.inner.direction != PortDirection::Input {
            return Err(Error::InvalidArg(format!(
                "{}: only input ports can be fed",
                self.inner.name
            )));
        }
        let state = self.state();
        if state != PortState::Enabled {
            return Err(self.invalid_state("feed", state));
        }
        let pool = self
            .pool()
            .ok_or_else(|| Error::MissingPool(self.inner.name.clone()))?;

        let chunk_size = pool.buffer_size();
        let mut chunks = data.chunks(chunk_size).peekable();
        if chunks.peek().is_none() {
            return self.feed_chunk(&pool, &[], eos);
        }
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            self.feed_chunk(&pool, chunk, eos && last)?;
        }
        Ok(())
    }

    fn feed_chunk(&self, pool: &Pool, chunk: &[u8], eos: bool) -> Result<()> {
        let context = &self.inner.context;
        let mut buffer = {
            let _guard = context.input_lock.lock();
            pool.queue()
                .timed_wait(context.config.input_wait())?
                .ok_or(Error::Timeout)?
        };
        buffer.read_into(chunk, eos)?;
        self.send_buffer(buffer)
    }

    /// Native callback for buffers returned by an output (or control) port.
    fn on_output_buffer(&self, buffer: Buffer) {
        let name = &self.inner.name;
        let operation = self.inner.operation.lock().clone();

        if let Some(event) = buffer.event() {
            let completion = match event {
                EventKind::Error => {
                    error!("{name}: error event received.");
                    Some(Completion::Failed)
                }
                EventKind::EndOfStream => {
                    debug!("{name}: end-of-stream event received.");
                    Some(Completion::EndOfStream)
                }
                EventKind::FormatChanged => {
                    info!("{name}: format changed event received.");
                    None
                }
                EventKind::ParameterChanged | EventKind::Other(_) => {
                    debug!("{name}: event {event:?} received.");
                    None
                }
            };
            buffer.release();
            if let (Some(completion), Some(operation)) = (completion, &operation) {
                self.resolve(operation, completion);
            }
            return;
        }

        let flags = buffer.flags();
        let length = buffer.length();
        let mode = self.capture_mode();
        let end_of_frame = flags.contains(BufferFlags::FRAME_END);
        let failed = flags.contains(BufferFlags::TRANSMISSION_FAILED);
        if failed {
            warn!("{name}: transmission failed.");
        }

        let terminal = if flags.contains(BufferFlags::END_OF_STREAM)
            || (end_of_frame && mode == CaptureMode::Single)
        {
            Some(Completion::EndOfStream)
        } else if self.force_stop_requested() {
            Some(Completion::ForceStopped)
        } else if operation
            .as_ref()
            .and_then(|op| op.deadline)
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            Some(Completion::TimedOut)
        } else if length == 0 && mode == CaptureMode::Single {
            Some(Completion::EndOfStream)
        } else {
            None
        };

        let pending = operation
            .as_ref()
            .is_none_or(|op| !op.trigger.is_completed());
        if terminal.is_none()
            && !failed
            && pending
            && length > 0
            && let Some(handler) = self.capture_handler()
        {
            buffer.with_payload(|data| handler.on_data_available(data, end_of_frame));
        }

        buffer.release();

        if terminal.is_none() && self.is_enabled() {
            self.replenish();
        }

        let outcome = if failed {
            Some(Completion::Failed)
        } else {
            terminal
        };
        if let (Some(outcome), Some(operation)) = (outcome, &operation) {
            self.resolve(operation, outcome);
        }
    }

    /// Native callback for buffers an input port has consumed.
    fn on_input_buffer(&self, buffer: Buffer) {
        if let Some(event) = buffer.event() {
            debug!("{}: event {event:?} on input port.", self.inner.name);
        }
        let eos = buffer.has_flags(BufferFlags::END_OF_STREAM);
        buffer.release();
        if eos {
            let operation = self.inner.operation.lock().clone();
            if let Some(operation) = operation {
                self.resolve(&operation, Completion::EndOfStream);
            }
        }
    }

    /// Sends a replacement buffer after one was consumed.
    fn replenish(&self) {
        let Some(pool) = self.pool() else {
            return;
        };
        let _guard = self.inner.context.output_lock.lock();
        match pool.queue().get() {
            Ok(Some(buffer)) => {
                if let Err(err) = self.send_buffer(buffer) {
                    warn!("{}: failed to send replacement buffer: {err}", self.inner.name);
                }
            }
            Ok(None) => warn!(
                "{}: no buffer available in pool, output stalls until one returns.",
                self.inner.name
            ),
            Err(_) => trace!("{}: pool destroyed, not replenishing.", self.inner.name),
        }
    }

    fn resolve(&self, operation: &Operation, completion: Completion) {
        if operation.trigger.signal(completion) {
            debug!("{}: operation finished ({completion}).", self.inner.name);
            if let Some(handler) = self.capture_handler() {
                handler.on_stream_end(completion);
            }
        }
    }

    /// Resolves the running operation from outside the callback.
    pub(crate) fn finish(&self, completion: Completion) {
        let operation = self.inner.operation.lock().clone();
        if let Some(operation) = operation {
            self.resolve(&operation, completion);
        }
    }

    fn invalid_state(&self, action: &'static str, state: PortState) -> Error {
        Error::InvalidState {
            object: self.inner.name.clone(),
            action,
            state: state.to_string(),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = self.format();
        write!(
            f,
            "{} ({}, {}, {} {}x{})",
            self.inner.name,
            self.inner.direction,
            self.state(),
            format.encoding,
            format.width,
            format.height
        )
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("direction", &self.inner.direction)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for PortInner {
    fn drop(&mut self) {
        if *self.state.get_mut() != PortState::Disabled {
            let status = self.context.native.disable_port(self.handle);
            if let Err(err) = Error::from_status(status, format!("{}: disable port", self.name)) {
                error!("{err}");
            }
        }
    }
}
