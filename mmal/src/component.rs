// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Components: processing stages owning a set of ports.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    native::{ComponentHandle, PortInfo},
    pipeline::PipelineContext,
    port::Port,
};

/// Something that can be switched on and off as a unit of a pipeline.
pub trait Lifecycle {
    fn name(&self) -> &str;
    fn enable(&self) -> Result<()>;
    fn disable(&self) -> Result<()>;
}

impl Lifecycle for Port {
    fn name(&self) -> &str {
        Port::name(self)
    }

    fn enable(&self) -> Result<()> {
        Port::enable(self)
    }

    fn disable(&self) -> Result<()> {
        Port::disable(self)
    }
}

/// Disables already-enabled items in reverse order, logging failures.
pub(crate) fn unwind<T: Lifecycle + ?Sized>(enabled: &[&T]) {
    for item in enabled.iter().rev() {
        if let Err(err) = item.disable() {
            warn!("{}: failed to disable while unwinding: {err}", item.name());
        }
    }
}

struct ComponentInner {
    id: Uuid,
    handle: ComponentHandle,
    name: String,
    kind: String,
    context: Arc<PipelineContext>,
    control: Port,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    force_stop: Arc<AtomicBool>,
    enabled: AtomicBool,
    destroyed: AtomicBool,
}

/// A processing stage of the graph.
///
/// Components are created through [`crate::Pipeline::create_component`] and
/// start enabled. `Component` is a cheap handle; clones refer to the same
/// stage.
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

impl Component {
    pub(crate) fn create(context: Arc<PipelineContext>, kind: &str) -> Result<Self> {
        let info = context
            .native
            .create_component(kind)
            .map_err(|status| match status {
                mmal_sys::MMAL_ENOENT => Error::UnknownComponent(kind.to_string()),
                status => Error::Native {
                    operation: format!("create component {kind}"),
                    status,
                },
            })?;

        let id = Uuid::new_v4();
        let force_stop = Arc::new(AtomicBool::new(false));
        let port = |info: PortInfo| Port::new(info, id, context.clone(), force_stop.clone());
        let control = port(info.control);
        let inputs = info.inputs.into_iter().map(&port).collect();
        let outputs = info.outputs.into_iter().map(&port).collect();

        let component = Self {
            inner: Arc::new(ComponentInner {
                id,
                handle: info.handle,
                name: info.name,
                kind: kind.to_string(),
                context: context.clone(),
                control,
                inputs,
                outputs,
                force_stop,
                enabled: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
            }),
        };
        component.enable()?;
        debug!("Created component {} ({kind}).", component.inner.name);
        Ok(component)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The kind this component was created from, e.g. `"camera"`.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn control(&self) -> &Port {
        &self.inner.control
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inner.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.inner.outputs
    }

    /// Input port `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if there is no such port.
    pub fn input(&self, index: usize) -> Result<&Port> {
        self.inner.inputs.get(index).ok_or_else(|| {
            Error::InvalidArg(format!("{}: no input port {index}", self.inner.name))
        })
    }

    /// Output port `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if there is no such port.
    pub fn output(&self, index: usize) -> Result<&Port> {
        self.inner.outputs.get(index).ok_or_else(|| {
            Error::InvalidArg(format!("{}: no output port {index}", self.inner.name))
        })
    }

    /// All ports, control port first.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        std::iter::once(&self.inner.control)
            .chain(self.inner.inputs.iter())
            .chain(self.inner.outputs.iter())
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) -> Result<()> {
        let status = self.inner.context.native.enable_component(self.inner.handle);
        Error::from_status(status, format!("{}: enable component", self.inner.name))?;
        self.inner.enabled.store(true, Ordering::Release);
        Ok(())
    }

    pub fn disable(&self) -> Result<()> {
        let status = self.inner.context.native.disable_component(self.inner.handle);
        Error::from_status(status, format!("{}: disable component", self.inner.name))?;
        self.inner.enabled.store(false, Ordering::Release);
        Ok(())
    }

    /// Requests (or clears) a forced stop of every operation on this
    /// component. The next callback on each port treats its buffer as
    /// terminal.
    pub fn set_force_stop(&self, stop: bool) {
        self.inner.force_stop.store(stop, Ordering::Release);
    }

    pub fn is_force_stop(&self) -> bool {
        self.inner.force_stop.load(Ordering::Acquire)
    }

    /// Enables every unconnected input and output port.
    ///
    /// On failure, the ports enabled by this call are disabled again in
    /// reverse order.
    pub fn enable_ports(&self) -> Result<()> {
        let mut enabled: Vec<&Port> = Vec::new();
        for port in self.inner.inputs.iter().chain(self.inner.outputs.iter()) {
            if port.is_connected() || port.is_enabled() {
                continue;
            }
            if let Err(err) = port.enable() {
                unwind(&enabled);
                return Err(err);
            }
            enabled.push(port);
        }
        Ok(())
    }

    /// Disables every enabled port, continuing past failures.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn disable_ports(&self) -> Result<()> {
        let mut first_error = None;
        for port in self.ports() {
            if let Err(err) = port.disable() {
                warn!("{}: {err}", port.name());
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Destroys pools left behind on disabled ports.
    pub fn clean_port_pools(&self) -> Result<()> {
        let mut first_error = None;
        for port in self.ports() {
            if let Err(err) = port.clean_pool() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Unconnected output ports with a capture handler: the ports an
    /// operation has to run and wait on.
    pub fn processing_ports(&self) -> Vec<Port> {
        self.inner
            .outputs
            .iter()
            .filter(|port| !port.is_connected() && port.has_capture_handler())
            .cloned()
            .collect()
    }

    /// Disables the ports and the component, then destroys it natively.
    pub(crate) fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.destroy()
    }
}

impl ComponentInner {
    fn destroy(&self) -> Result<()> {
        for port in std::iter::once(&self.control)
            .chain(self.inputs.iter())
            .chain(self.outputs.iter())
        {
            if let Err(err) = port.disable() {
                warn!("{}: {err}", port.name());
            }
        }
        let native = &self.context.native;
        if self.enabled.swap(false, Ordering::AcqRel) {
            let status = native.disable_component(self.handle);
            if let Err(err) = Error::from_status(status, format!("{}: disable component", self.name)) {
                warn!("{err}");
            }
        }
        let status = native.destroy_component(self.handle);
        Error::from_status(status, format!("{}: destroy component", self.name))?;
        debug!("Destroyed component {}.", self.name);
        Ok(())
    }
}

impl Drop for ComponentInner {
    fn drop(&mut self) {
        if !*self.destroyed.get_mut()
            && let Err(err) = self.destroy()
        {
            error!("{err}");
        }
    }
}

impl Lifecycle for Component {
    fn name(&self) -> &str {
        Component::name(self)
    }

    fn enable(&self) -> Result<()> {
        Component::enable(self)
    }

    fn disable(&self) -> Result<()> {
        Component::disable(self)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Component: {} ({})", self.inner.name, self.inner.kind)?;
        for port in self.inner.inputs.iter().chain(self.inner.outputs.iter()) {
            writeln!(f, "    {port}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .finish()
    }
}
