// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The boundary between the core and the native multimedia layer.
//!
//! The native layer owns the fixed-function graph: components, their ports
//! and the connections between them. It calls back into the core through the
//! [`BufferHandler`] and [`ConnectionHandler`] capabilities registered when a
//! port or connection is enabled. Callbacks for one port are serialized;
//! callbacks for different ports may run concurrently on the native layer's
//! own worker threads.
//!
//! Every call returns a raw [`mmal_sys::Status`]; the core converts it with
//! [`crate::Error::from_status`].

pub mod soft;

use std::{fmt, sync::Arc};

use mmal_sys::{Rational, Status};

use crate::{buffer::Buffer, port::PortFormat, queue::Queue};

/// Native handle of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle(pub u32);

/// Native handle of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortHandle(pub u32);

/// Native handle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u32);

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Control,
    Input,
    Output,
}

impl PortDirection {
    pub fn port_type(self) -> u32 {
        match self {
            PortDirection::Control => mmal_sys::MMAL_PORT_TYPE_CONTROL,
            PortDirection::Input => mmal_sys::MMAL_PORT_TYPE_INPUT,
            PortDirection::Output => mmal_sys::MMAL_PORT_TYPE_OUTPUT,
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PortDirection::Control => "control",
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        };
        f.write_str(text)
    }
}

/// Description of a port as created by the native layer.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub handle: PortHandle,
    pub name: String,
    pub direction: PortDirection,
    pub index: usize,
    pub format: PortFormat,
}

/// Description of a component and its ports.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub handle: ComponentHandle,
    pub name: String,
    pub control: PortInfo,
    pub inputs: Vec<PortInfo>,
    pub outputs: Vec<PortInfo>,
}

/// Opaque parameter value. The core never interprets these.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    U32(u32),
    I32(i32),
    Rational(Rational),
    Bytes(Vec<u8>),
}

/// Capability invoked by the native layer for every buffer a port returns.
pub trait BufferHandler: Send + Sync {
    fn on_buffer(&self, buffer: Buffer);
}

/// Capability invoked by the native layer when a callback-driven connection
/// has work: a buffer in its completion queue or a free buffer in its pool.
pub trait ConnectionHandler: Send + Sync {
    fn on_ready(&self);
}

/// Registration passed when enabling a callback-driven connection.
#[derive(Clone)]
pub struct ConnectionBinding {
    /// Queue receiving buffers produced by the upstream port.
    pub queue: Queue,
    pub handler: Arc<dyn ConnectionHandler>,
}

/// Operations the core issues against the native multimedia layer.
///
/// Buffers handed to the native layer are owned by it until they come back
/// through a [`BufferHandler`] or a [`ConnectionBinding`] queue. A buffer the
/// native layer refuses is dropped, which returns it to its pool.
pub trait NativeLayer: Send + Sync {
    /// Creates a component of the given kind (for example `"camera"`).
    fn create_component(&self, kind: &str) -> Result<ComponentInfo, Status>;

    fn destroy_component(&self, component: ComponentHandle) -> Status;

    fn enable_component(&self, component: ComponentHandle) -> Status;

    fn disable_component(&self, component: ComponentHandle) -> Status;

    /// Commits `format` on the port and fills in the buffer requirements
    /// (`buffer_num_min`, `buffer_size_min` and their recommended values).
    fn commit_format(&self, port: PortHandle, format: &mut PortFormat) -> Status;

    fn set_parameter(&self, port: PortHandle, id: u32, value: &ParameterValue) -> Status;

    fn get_parameter(&self, port: PortHandle, id: u32) -> Result<ParameterValue, Status>;

    /// Enables a port. `handler` receives every buffer the port returns.
    fn enable_port(&self, port: PortHandle, handler: Option<Arc<dyn BufferHandler>>) -> Status;

    /// Disables a port. Buffers still held by the port are released and no
    /// further callbacks are issued for it.
    fn disable_port(&self, port: PortHandle) -> Status;

    /// Hands a buffer to a port: an empty buffer to fill for outputs, a
    /// payload to consume for inputs.
    fn send_buffer(&self, port: PortHandle, buffer: Buffer) -> Status;

    fn create_connection(
        &self,
        output: PortHandle,
        input: PortHandle,
        flags: u32,
    ) -> Result<ConnectionHandle, Status>;

    /// Enables a connection. Tunnelled connections pass no binding.
    fn enable_connection(
        &self,
        connection: ConnectionHandle,
        binding: Option<ConnectionBinding>,
    ) -> Status;

    fn disable_connection(&self, connection: ConnectionHandle) -> Status;

    fn destroy_connection(&self, connection: ConnectionHandle) -> Status;
}
