// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Connections: managed edges from an output port to an input port.
//!
//! A tunnelled connection leaves buffer movement entirely to the native layer;
//! the core only drives its lifecycle. A callback-driven connection owns a
//! pool whose buffers cross the edge through the core, so a
//! [`ConnectionListener`] can observe the data.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    component::{Component, Lifecycle},
    handler::ConnectionListener,
    native::{ConnectionBinding, ConnectionHandle, ConnectionHandler, ParameterValue},
    pipeline::PipelineContext,
    pool::Pool,
    port::Port,
    queue::Queue,
};

/// How buffers travel across a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Buffers move inside the native layer, invisible to the core.
    #[default]
    Tunnelled,
    /// Every buffer crosses the edge through the core.
    CallbackDriven,
}

struct ConnectionInner {
    id: Uuid,
    handle: ConnectionHandle,
    context: Arc<PipelineContext>,
    mode: ConnectionMode,
    output: Port,
    input: Port,
    upstream: Component,
    downstream: Component,
    pool: Option<Pool>,
    queue: Queue,
    listener: Mutex<Option<Arc<dyn ConnectionListener>>>,
    enabled: AtomicBool,
    destroyed: AtomicBool,
}

/// An edge of the graph.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionCallback {
    connection: Weak<ConnectionInner>,
}

impl ConnectionHandler for ConnectionCallback {
    fn on_ready(&self) {
        if let Some(inner) = self.connection.upgrade() {
            Connection { inner }.process();
        }
    }
}

impl Connection {
    pub(crate) fn create(
        context: Arc<PipelineContext>,
        upstream: Component,
        output: Port,
        downstream: Component,
        input: Port,
        mode: ConnectionMode,
    ) -> Result<Self> {
        let mut flags = mmal_sys::MMAL_CONNECTION_FLAG_ALLOCATION_ON_INPUT;
        if mode == ConnectionMode::Tunnelled {
            flags |= mmal_sys::MMAL_CONNECTION_FLAG_TUNNELLING;
        }

        input.adopt_format(&output.format())?;

        let handle = context
            .native
            .create_connection(output.handle(), input.handle(), flags)
            .map_err(|status| Error::Native {
                operation: format!("{}: connect to {}", output.name(), input.name()),
                status,
            })?;

        let id = Uuid::new_v4();
        let attached = output.attach_connection(id).and_then(|()| {
            input
                .attach_connection(id)
                .inspect_err(|_| output.detach_connection())
        });
        let pool = attached.and_then(|()| match mode {
            ConnectionMode::Tunnelled => Ok(None),
            ConnectionMode::CallbackDriven => {
                output.set_parameter(mmal_sys::MMAL_PARAMETER_ZERO_COPY, ParameterValue::Bool(true))?;
                input.set_parameter(mmal_sys::MMAL_PARAMETER_ZERO_COPY, ParameterValue::Bool(true))?;
                let out_format = output.format();
                let in_format = input.format();
                Pool::new(
                    format!("{} -> {}", output.name(), input.name()),
                    out_format.buffer_num.max(in_format.buffer_num),
                    out_format.buffer_size.max(in_format.buffer_size),
                )
                .map(Some)
            }
        });
        let pool = match pool {
            Ok(pool) => pool,
            Err(err) => {
                if output.connection_id() == Some(id) {
                    output.detach_connection();
                }
                if input.connection_id() == Some(id) {
                    input.detach_connection();
                }
                context.native.destroy_connection(handle);
                return Err(err);
            }
        };

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id,
                handle,
                context,
                mode,
                output,
                input,
                upstream,
                downstream,
                pool,
                queue: Queue::new(),
                listener: Mutex::new(None),
                enabled: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
            }),
        };
        debug!("Created {connection}.");
        Ok(connection)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn mode(&self) -> ConnectionMode {
        self.inner.mode
    }

    /// The upstream output port.
    pub fn output(&self) -> &Port {
        &self.inner.output
    }

    /// The downstream input port.
    pub fn input(&self) -> &Port {
        &self.inner.input
    }

    pub fn upstream(&self) -> &Component {
        &self.inner.upstream
    }

    pub fn downstream(&self) -> &Component {
        &self.inner.downstream
    }

    /// The connection's own pool; only callback-driven connections have one.
    pub fn pool(&self) -> Option<&Pool> {
        self.inner.pool.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Registers an observer of the data crossing a callback-driven edge.
    pub fn set_listener(&self, listener: Arc<dyn ConnectionListener>) {
        *self.inner.listener.lock() = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.inner.listener.lock().clone()
    }

    /// Enables the connection.
    ///
    /// For a callback-driven connection, every buffer of the connection pool
    /// is then handed to the upstream output port.
    pub fn enable(&self) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }
        let binding = match self.inner.mode {
            ConnectionMode::Tunnelled => None,
            ConnectionMode::CallbackDriven => Some(ConnectionBinding {
                queue: self.inner.queue.clone(),
                handler: Arc::new(ConnectionCallback {
                    connection: Arc::downgrade(&self.inner),
                }),
            }),
        };
        let status = self
            .inner
            .context
            .native
            .enable_connection(self.inner.handle, binding);
        Error::from_status(status, format!("{self}: enable"))?;
        self.inner.enabled.store(true, Ordering::Release);

        if let Some(pool) = &self.inner.pool
            && let Err(err) = self.inner.output.send_all_buffers(pool)
        {
            if let Err(disable_err) = self.disable() {
                warn!("{self}: {disable_err}");
            }
            return Err(err);
        }
        debug!("Enabled {self}.");
        Ok(())
    }

    /// Disables the connection and waits for the connection pool to refill.
    pub fn disable(&self) -> Result<()> {
        if !self.inner.enabled.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let status = self
            .inner
            .context
            .native
            .disable_connection(self.inner.handle);
        let result = Error::from_status(status, format!("{self}: disable"));
        drop(self.inner.queue.take_all());
        if let Some(pool) = &self.inner.pool {
            pool.drain(self.inner.context.config.drain_timeout())?;
        }
        result?;
        debug!("Disabled {self}.");
        Ok(())
    }

    /// Tears the connection down: the upstream reference is closed, then the
    /// downstream one, then the native connection is destroyed and both
    /// components clean their port pools; the connection pool goes last.
    pub(crate) fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(err) = self.disable() {
            warn!("{self}: {err}");
        }
        self.inner.output.detach_connection();
        self.inner.input.detach_connection();

        let status = self
            .inner
            .context
            .native
            .destroy_connection(self.inner.handle);
        for component in [&self.inner.upstream, &self.inner.downstream] {
            if let Err(err) = component.clean_port_pools() {
                warn!("{}: {err}", component.name());
            }
        }
        Error::from_status(status, format!("{self}: destroy"))?;

        if let Some(pool) = &self.inner.pool {
            pool.destroy()?;
        }
        self.inner.queue.destroy();
        debug!("Destroyed {self}.");
        Ok(())
    }

    /// Moves one buffer across the edge: a filled buffer from the completion
    /// queue goes to the downstream input, otherwise a free pool buffer goes
    /// back to the upstream output.
    fn process(&self) {
        if !self.is_enabled() {
            drop(self.inner.queue.take_all());
            return;
        }

        match self.inner.queue.get() {
            Ok(Some(buffer)) => {
                if buffer.length() > 0
                    && let Some(listener) = self.listener()
                {
                    buffer.with_payload(|data| listener.on_input(data));
                }
                if let Err(err) = self.inner.input.send_buffer(buffer) {
                    warn!("{self}: {err}");
                }
                return;
            }
            Ok(None) => {}
            Err(_) => return,
        }

        let Some(pool) = &self.inner.pool else {
            return;
        };
        match pool.queue().get() {
            Ok(Some(buffer)) => {
                if let Some(listener) = self.listener() {
                    buffer.with_payload(|data| listener.on_output(data));
                }
                if let Err(err) = self.inner.output.send_buffer(buffer) {
                    warn!("{self}: {err}");
                }
            }
            Ok(None) => info!("{self}: buffer could not be obtained by connection callback."),
            Err(_) => trace!("{self}: pool destroyed."),
        }
    }
}

impl Lifecycle for Connection {
    fn name(&self) -> &str {
        self.inner.output.name()
    }

    fn enable(&self) -> Result<()> {
        Connection::enable(self)
    }

    fn disable(&self) -> Result<()> {
        Connection::disable(self)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Component connection - Upstream component: {} on port {} Downstream component: {} on port {}",
            self.inner.upstream.name(),
            self.inner.output.name(),
            self.inner.downstream.name(),
            self.inner.input.name()
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("output", &self.inner.output.name())
            .field("input", &self.inner.input.name())
            .finish()
    }
}
