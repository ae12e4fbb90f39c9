// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # MMAL - callback-driven media pipeline engine
//!
//! Safe, idiomatic Rust orchestration of a fixed-function, hardware-accelerated
//! media graph (capture → transform → encode → sink) exposed by a native
//! multimedia layer. Frames move through the graph in fixed-size, recyclable
//! buffers without being copied by the core.
//!
//! ## Overview
//!
//! Applications assemble a directed graph of components, each exposing typed
//! ports, then run capture operations over it. The core manages the buffer
//! economy (pools, queues, reference counting), the enable/drain/disable
//! lifecycle of ports and connections, and signals the completion of every
//! operation (end-of-stream, timeout, forced stop, failure) to the caller.
//!
//! ### Key Concepts
//!
//! - **Buffer**: a recyclable fixed-capacity memory block plus metadata ([`Buffer`])
//! - **Pool**: a fixed set of buffers backed by one [`Queue`] ([`Pool`])
//! - **Port**: a typed endpoint of a component: configuration, state, replenishment ([`Port`])
//! - **Component**: a processing stage owning its ports ([`Component`])
//! - **Connection**: an edge from an output port to an input port, tunnelled or callback-driven ([`Connection`])
//! - **Trigger**: a one-shot completion signal ([`Trigger`])
//! - **Pipeline**: the explicit context and capture orchestrator ([`Pipeline`])
//!
//! The native layer sits behind the [`NativeLayer`] trait. [`SoftLayer`] is a
//! software rendition of the graph for hosts without the firmware.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐
//! │ Pipeline │  (native layer, config, pool locks)
//! └────┬─────┘
//!      │
//!      ├─► Component ──► Port ──► Pool ──► Queue ──► Buffer
//!      │                   ▲
//!      │                   │ BufferHandler callbacks
//!      │             ┌─────┴───────┐
//!      └─► Connection│ NativeLayer │
//!                    └─────────────┘
//! ```
//!
//! ## Examples
//!
//! ### Capturing a still through an image encoder
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mmal::{
//!     CaptureOptions, ConnectionMode, Encoding, InMemoryHandler, Pipeline, PortConfig,
//!     config::PipelineConfig, native::soft::SoftConfig,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), mmal::Error> {
//! let pipeline = Pipeline::with_soft_layer(SoftConfig::default(), PipelineConfig::default());
//! let camera = pipeline.create_component("camera")?;
//! let encoder = pipeline.create_component("encoder.image")?;
//!
//! let still = camera.output(2)?;
//! still.configure(PortConfig::new(Encoding::I420).with_resolution(640, 480))?;
//! pipeline.connect(still, encoder.input(0)?, ConnectionMode::Tunnelled)?;
//! encoder.output(0)?.configure(PortConfig::new(Encoding::JPEG))?;
//!
//! let handler = Arc::new(InMemoryHandler::new());
//! encoder.output(0)?.set_capture_handler(handler.clone());
//!
//! let report = pipeline.capture(still, CaptureOptions::new()).await?;
//! assert!(report.is_success());
//! println!("captured {} byte(s)", handler.data().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - The native layer invokes port and connection callbacks on its own
//!   threads: serialized per port, concurrent across ports
//! - [`Pipeline`], [`Component`], [`Port`], [`Connection`], [`Pool`] and
//!   [`Queue`] are `Send + Sync` handles
//! - Capture handlers run on callback threads and must not block for long

mod buffer;
mod component;
mod connection;
mod error;
mod handler;
mod pipeline;
mod pool;
mod port;
mod queue;
mod trigger;

pub mod config;
pub mod native;

pub use buffer::{Buffer, BufferFlags, EventKind};
pub use component::{Component, Lifecycle};
pub use connection::{Connection, ConnectionMode};
pub use error::{Error, Result};
pub use handler::{CaptureHandler, ConnectionListener, InMemoryHandler};
pub use mmal_sys::Rational;
pub use native::{NativeLayer, soft::SoftLayer};
pub use pipeline::{CaptureOptions, CaptureReport, Pipeline};
pub use pool::Pool;
pub use port::{
    CaptureMode, Crop, Encoding, Port, PortConfig, PortFormat, PortState, align_up, pad_height,
    pad_width,
};
pub use queue::Queue;
pub use trigger::{Completion, Trigger, TriggerWait};
