// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! A software rendition of the fixed-function media graph.
//!
//! [`SoftLayer`] implements [`NativeLayer`] without any firmware: a camera
//! synthesizes frames, splitters and encoders copy payload between ports and
//! sinks discard it. It keeps the threading contract of the real layer: each
//! port owns a serial lane (a worker thread), so callbacks for one port never
//! overlap while different ports run concurrently.
//!
//! Capture starts when [`mmal_sys::MMAL_PARAMETER_CAPTURE`] is set to `true`
//! on a camera output and stops when it is set to `false`. Output 0 and 1
//! produce video frames (last chunk flagged end-of-frame); output 2 produces
//! a single still followed by an empty end-of-frame + end-of-stream marker.
//! An output without a buffer to fill drops the frame.

use std::{
    collections::{HashMap, VecDeque},
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use mmal_sys::{Rational, Status};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use super::{
    BufferHandler, ComponentHandle, ComponentInfo, ConnectionBinding, ConnectionHandle,
    NativeLayer, ParameterValue, PortDirection, PortHandle, PortInfo,
};
use crate::{
    Result,
    buffer::{Buffer, BufferFlags},
    port::{Encoding, PortFormat},
};

/// Settings of the software backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftConfig {
    /// Delay between two synthesized frames.
    pub frame_interval_ms: u64,
    /// Size in bytes of a synthesized frame.
    pub frame_size: usize,
    /// Ends the stream with an end-of-stream marker after this many frames.
    pub frame_limit: Option<u32>,
    /// Frames between two keyframes emitted by the video encoder.
    pub intra_period: u32,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33,
            frame_size: 16 * 1024,
            frame_limit: None,
            intra_period: 30,
        }
    }
}

impl SoftConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Camera,
    Splitter,
    VideoEncoder,
    ImageEncoder,
    Resizer,
    NullSink,
    Renderer,
}

impl Kind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "camera" => Some(Kind::Camera),
            "splitter" => Some(Kind::Splitter),
            "encoder.video" => Some(Kind::VideoEncoder),
            "encoder.image" => Some(Kind::ImageEncoder),
            "resizer" => Some(Kind::Resizer),
            "null_sink" => Some(Kind::NullSink),
            "renderer" => Some(Kind::Renderer),
            _ => None,
        }
    }

    fn native_name(self) -> &'static str {
        match self {
            Kind::Camera => "vc.ril.camera",
            Kind::Splitter => "vc.ril.video_splitter",
            Kind::VideoEncoder => "vc.ril.video_encode",
            Kind::ImageEncoder => "vc.ril.image_encode",
            Kind::Resizer => "vc.ril.resize",
            Kind::NullSink => "vc.null_sink",
            Kind::Renderer => "vc.ril.video_render",
        }
    }

    /// Number of input and output ports.
    fn layout(self) -> (usize, usize) {
        match self {
            Kind::Camera => (0, 3),
            Kind::Splitter => (1, 4),
            Kind::VideoEncoder | Kind::ImageEncoder | Kind::Resizer => (1, 1),
            Kind::NullSink | Kind::Renderer => (1, 0),
        }
    }

    fn output_encoding(self) -> Encoding {
        match self {
            Kind::VideoEncoder => Encoding::H264,
            Kind::ImageEncoder => Encoding::JPEG,
            _ => Encoding::I420,
        }
    }
}

fn default_format(encoding: Encoding) -> PortFormat {
    let mut format = PortFormat {
        encoding,
        width: 640,
        height: 480,
        framerate: Rational::new(30, 1),
        ..PortFormat::default()
    };
    format.crop.width = format.width;
    format.crop.height = format.height;
    apply_requirements(&mut format);
    format
}

/// Fills in buffer requirements the way the firmware reports them.
fn apply_requirements(format: &mut PortFormat) {
    let (size_min, size_recommended) = match format.encoding.frame_size(format.width, format.height)
    {
        Some(size) if size > 0 => (size, size),
        _ => (2048, 64 * 1024),
    };
    format.buffer_num_min = 1;
    format.buffer_num_recommended = 3;
    format.buffer_size_min = size_min;
    format.buffer_size_recommended = size_recommended;
    if format.buffer_num < format.buffer_num_min {
        format.buffer_num = format.buffer_num_recommended;
    }
    if format.buffer_size < format.buffer_size_min {
        format.buffer_size = format.buffer_size_recommended;
    }
}

/// Moves flags that describe the start of a payload to the first chunk and
/// the rest to the last one.
fn split_flags(flags: BufferFlags) -> (BufferFlags, BufferFlags) {
    let leading = BufferFlags::FRAME_START | BufferFlags::KEYFRAME | BufferFlags::CONFIG;
    let first = BufferFlags::from_bits(flags.bits() & leading.bits());
    let last = BufferFlags::from_bits(flags.bits() & !leading.bits());
    (first, last)
}

fn synthesize(frame: u64, size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i as u64).wrapping_add(frame) as u8)
        .collect()
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial executor of one port's callbacks.
#[derive(Clone)]
struct Lane {
    jobs: mpsc::Sender<Job>,
}

impl Lane {
    fn spawn(name: &str) -> std::io::Result<Self> {
        let (jobs, pending) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(format!("lane {name}"))
            .spawn(move || {
                while let Ok(job) = pending.recv() {
                    job();
                }
            })?;
        Ok(Self { jobs })
    }

    fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.jobs.send(Box::new(job)).is_err() {
            warn!("Port lane closed, dropping callback.");
        }
    }
}

#[derive(Clone)]
enum Sink {
    Handler(Arc<dyn BufferHandler>),
    Connection(ConnectionBinding),
}

impl Sink {
    fn deliver(self, buffer: Buffer) {
        match self {
            Sink::Handler(handler) => handler.on_buffer(buffer),
            Sink::Connection(binding) => {
                binding.queue.put(buffer);
                binding.handler.on_ready();
            }
        }
    }
}

enum Route {
    Tunnel { input: u32, lane: Lane },
    Buffers { sink: Sink, lane: Lane },
    Closed,
}

struct SoftPort {
    name: String,
    component: u32,
    direction: PortDirection,
    index: usize,
    format: PortFormat,
    params: HashMap<u32, ParameterValue>,
    enabled: bool,
    handler: Option<Arc<dyn BufferHandler>>,
    held: VecDeque<Buffer>,
    connection: Option<u32>,
    lane: Lane,
    gathered: Vec<u8>,
    frames: u64,
    mid_frame: bool,
}

struct SoftComponent {
    kind: Kind,
    ports: Vec<u32>,
    outputs: Vec<u32>,
    enabled: bool,
}

struct SoftConnection {
    output: u32,
    input: u32,
    tunnelled: bool,
    enabled: bool,
    binding: Option<ConnectionBinding>,
}

struct Producer {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Producer {
    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.thread.join().is_err() {
            error!("Capture thread panicked.");
        }
    }
}

#[derive(Default)]
struct Graph {
    components: HashMap<u32, SoftComponent>,
    ports: HashMap<u32, SoftPort>,
    connections: HashMap<u32, SoftConnection>,
    producers: HashMap<u32, Producer>,
}

/// What a port gives back when it is shut: buffers it held and the capture
/// thread feeding it. Released after the graph lock is dropped.
#[derive(Default)]
struct Leftovers {
    buffers: Vec<Buffer>,
    producers: Vec<Producer>,
}

impl Leftovers {
    fn release(self) {
        drop(self.buffers);
        for producer in self.producers {
            producer.stop();
        }
    }
}

impl Graph {
    fn output_route(&self, port: u32) -> Route {
        let Some(p) = self.ports.get(&port) else {
            return Route::Closed;
        };
        if !p.enabled {
            return Route::Closed;
        }
        if let Some(connection) = p.connection.and_then(|id| self.connections.get(&id))
            && connection.enabled
        {
            if connection.tunnelled {
                return match self.ports.get(&connection.input) {
                    Some(input) => Route::Tunnel {
                        input: connection.input,
                        lane: input.lane.clone(),
                    },
                    None => Route::Closed,
                };
            }
            if let Some(binding) = &connection.binding {
                return Route::Buffers {
                    sink: Sink::Connection(binding.clone()),
                    lane: p.lane.clone(),
                };
            }
        }
        match &p.handler {
            Some(handler) => Route::Buffers {
                sink: Sink::Handler(handler.clone()),
                lane: p.lane.clone(),
            },
            None => Route::Closed,
        }
    }

    /// Where a consumed input buffer goes back to.
    fn input_return(&self, port: u32) -> Option<Sink> {
        let p = self.ports.get(&port)?;
        if let Some(connection) = p.connection.and_then(|id| self.connections.get(&id))
            && let Some(binding) = &connection.binding
        {
            return Some(Sink::Connection(binding.clone()));
        }
        p.handler.clone().map(Sink::Handler)
    }

    fn shut_port(&mut self, port: u32, leftovers: &mut Leftovers) {
        if let Some(p) = self.ports.get_mut(&port) {
            p.enabled = false;
            p.handler = None;
            p.gathered.clear();
            p.mid_frame = false;
            leftovers.buffers.extend(p.held.drain(..));
        }
        if let Some(producer) = self.producers.remove(&port) {
            leftovers.producers.push(producer);
        }
    }
}

struct Shared {
    config: SoftConfig,
    graph: Mutex<Graph>,
    next_handle: AtomicU32,
}

impl Shared {
    fn next_handle(&self) -> u32 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn take_held(&self, port: u32) -> Option<Buffer> {
        let mut graph = self.graph.lock();
        let p = graph.ports.get_mut(&port)?;
        if !p.enabled {
            return None;
        }
        p.held.pop_front()
    }

    /// Emits one payload on an output port, split over as many held buffers
    /// as it takes.
    fn deliver(
        self: &Arc<Self>,
        port: u32,
        payload: &[u8],
        first: BufferFlags,
        last: BufferFlags,
        pts: i64,
    ) {
        let route = self.graph.lock().output_route(port);
        match route {
            Route::Closed => trace!("Port {port}: closed, discarding payload."),
            Route::Tunnel { input, lane } => {
                let shared = Arc::clone(self);
                let payload = payload.to_vec();
                lane.submit(move || shared.process_input(input, &payload, first | last, pts));
            }
            Route::Buffers { sink, lane } => {
                let mut offset = 0;
                loop {
                    let Some(mut buffer) = self.take_held(port) else {
                        debug!(
                            "Port {port}: no buffer available, dropping {} byte(s).",
                            payload.len() - offset
                        );
                        return;
                    };
                    let written = buffer.write_payload(&payload[offset..]);
                    let mut flags = if offset == 0 { first } else { BufferFlags::NONE };
                    offset += written;
                    let done = offset >= payload.len() || written == 0;
                    if done {
                        flags |= last;
                    }
                    buffer.set_flags(flags);
                    buffer.set_timestamps(pts, pts);
                    let sink = sink.clone();
                    lane.submit(move || sink.deliver(buffer));
                    if done {
                        return;
                    }
                }
            }
        }
    }

    /// Runs a component's processing for a payload arriving on an input.
    fn process_input(self: &Arc<Self>, port: u32, payload: &[u8], flags: BufferFlags, pts: i64) {
        enum Work {
            Copy(Vec<u32>),
            Encode(u32, BufferFlags),
            Still(u32, Option<Vec<u8>>),
            Discard,
        }

        let work = {
            let mut graph = self.graph.lock();
            let Graph {
                components, ports, ..
            } = &mut *graph;
            let Some(p) = ports.get_mut(&port) else {
                return;
            };
            let Some(component) = components.get(&p.component) else {
                return;
            };
            if !component.enabled {
                trace!("{}: component disabled, discarding payload.", p.name);
                return;
            }
            match component.kind {
                Kind::Splitter | Kind::Resizer => Work::Copy(component.outputs.clone()),
                Kind::VideoEncoder => {
                    let mut extra = BufferFlags::NONE;
                    if !p.mid_frame
                        && p.frames % u64::from(self.config.intra_period.max(1)) == 0
                        && !payload.is_empty()
                    {
                        extra = BufferFlags::KEYFRAME;
                    }
                    p.mid_frame = !flags.contains(BufferFlags::FRAME_END);
                    if flags.contains(BufferFlags::FRAME_END) {
                        p.frames += 1;
                    }
                    match component.outputs.first() {
                        Some(&out) => Work::Encode(out, extra),
                        None => Work::Discard,
                    }
                }
                Kind::ImageEncoder => {
                    p.gathered.extend_from_slice(payload);
                    let complete = flags.contains(BufferFlags::FRAME_END)
                        || flags.contains(BufferFlags::END_OF_STREAM);
                    match component.outputs.first() {
                        Some(&out) => Work::Still(out, complete.then(|| mem::take(&mut p.gathered))),
                        None => Work::Discard,
                    }
                }
                Kind::NullSink | Kind::Renderer | Kind::Camera => Work::Discard,
            }
        };

        let (first, last) = split_flags(flags);
        match work {
            Work::Copy(outputs) => {
                for out in outputs {
                    self.deliver(out, payload, first, last, pts);
                }
            }
            Work::Encode(out, extra) => self.deliver(out, payload, first | extra, last, pts),
            Work::Still(out, Some(still)) => {
                if !still.is_empty() {
                    self.deliver(out, &still, BufferFlags::FRAME_START, BufferFlags::NONE, pts);
                }
                self.deliver(
                    out,
                    &[],
                    BufferFlags::NONE,
                    BufferFlags::FRAME_END | BufferFlags::END_OF_STREAM,
                    pts,
                );
            }
            Work::Still(_, None) => {}
            Work::Discard => trace!("Port {port}: consumed {} byte(s).", payload.len()),
        }
    }

    /// Consumes a buffer sent to an input port and hands it back.
    fn consume_input(self: &Arc<Self>, port: u32, buffer: Buffer) {
        let payload = buffer.to_vec();
        self.process_input(port, &payload, buffer.flags(), buffer.pts());
        let sink = self.graph.lock().input_return(port);
        match sink {
            Some(Sink::Connection(binding)) => {
                drop(buffer);
                binding.handler.on_ready();
            }
            Some(Sink::Handler(handler)) => handler.on_buffer(buffer),
            None => drop(buffer),
        }
    }

    fn produce(self: &Arc<Self>, port: u32, still: bool, stop: &AtomicBool) {
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        let interval_us = i64::try_from(interval.as_micros()).unwrap_or(i64::MAX);
        let mut frame: u64 = 0;
        loop {
            thread::sleep(interval);
            if stop.load(Ordering::Acquire) {
                break;
            }
            let pts = interval_us.saturating_mul(frame as i64);
            let payload = synthesize(frame, self.config.frame_size);
            if still {
                self.deliver(port, &payload, BufferFlags::FRAME_START, BufferFlags::NONE, pts);
                self.deliver(
                    port,
                    &[],
                    BufferFlags::NONE,
                    BufferFlags::FRAME_END | BufferFlags::END_OF_STREAM,
                    pts,
                );
                break;
            }
            self.deliver(
                port,
                &payload,
                BufferFlags::FRAME_START,
                BufferFlags::FRAME_END,
                pts,
            );
            frame += 1;
            if let Some(limit) = self.config.frame_limit
                && frame >= u64::from(limit)
            {
                self.deliver(port, &[], BufferFlags::NONE, BufferFlags::END_OF_STREAM, pts);
                break;
            }
        }
        trace!("Port {port}: capture thread finished after {frame} frame(s).");
    }

    fn start_capture(self: &Arc<Self>, port: u32) -> Status {
        let mut graph = self.graph.lock();
        let Some(p) = graph.ports.get(&port) else {
            return mmal_sys::MMAL_ENOENT;
        };
        let Some(component) = graph.components.get(&p.component) else {
            return mmal_sys::MMAL_ENOENT;
        };
        if component.kind != Kind::Camera || p.direction != PortDirection::Output {
            return mmal_sys::MMAL_EINVAL;
        }
        if !component.enabled {
            return mmal_sys::MMAL_ENOTREADY;
        }
        if graph.producers.contains_key(&port) {
            return mmal_sys::MMAL_SUCCESS;
        }
        let still = p.index == 2;
        let label = format!(
            "{}: capture started ({} {}x{}).",
            p.name, p.format.encoding, p.format.width, p.format.height
        );
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(self);
        let flag = stop.clone();
        let spawned = thread::Builder::new()
            .name(format!("capture {}", p.name))
            .spawn(move || shared.produce(port, still, &flag));
        match spawned {
            Ok(thread) => {
                debug!("{label}");
                graph.producers.insert(port, Producer { stop, thread });
                mmal_sys::MMAL_SUCCESS
            }
            Err(err) => {
                error!("Port {port}: failed to start capture thread: {err}");
                mmal_sys::MMAL_ENOSPC
            }
        }
    }

    fn stop_capture(&self, port: u32) -> Status {
        let producer = self.graph.lock().producers.remove(&port);
        if let Some(producer) = producer {
            producer.stop();
            debug!("Port {port}: capture stopped.");
        }
        mmal_sys::MMAL_SUCCESS
    }
}

/// [`NativeLayer`] implemented in software.
pub struct SoftLayer {
    shared: Arc<Shared>,
}

impl SoftLayer {
    pub fn new(config: SoftConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                graph: Mutex::new(Graph::default()),
                next_handle: AtomicU32::new(1),
            }),
        }
    }

    pub fn config(&self) -> &SoftConfig {
        &self.shared.config
    }

    fn create_port(
        &self,
        component: u32,
        component_name: &str,
        direction: PortDirection,
        index: usize,
        format: PortFormat,
    ) -> std::result::Result<(PortInfo, SoftPort), Status> {
        let handle = self.shared.next_handle();
        let tag = match direction {
            PortDirection::Control => "ctr",
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        let name = format!("{component_name}:{tag}:{index}");
        let lane = Lane::spawn(&name).map_err(|err| {
            error!("{name}: failed to start port lane: {err}");
            mmal_sys::MMAL_ENOSPC
        })?;
        let info = PortInfo {
            handle: PortHandle(handle),
            name: name.clone(),
            direction,
            index,
            format: format.clone(),
        };
        let port = SoftPort {
            name,
            component,
            direction,
            index,
            format,
            params: HashMap::new(),
            enabled: false,
            handler: None,
            held: VecDeque::new(),
            connection: None,
            lane,
            gathered: Vec::new(),
            frames: 0,
            mid_frame: false,
        };
        Ok((info, port))
    }
}

impl Default for SoftLayer {
    fn default() -> Self {
        Self::new(SoftConfig::default())
    }
}

impl Drop for SoftLayer {
    fn drop(&mut self) {
        let producers: Vec<Producer> = {
            let mut graph = self.shared.graph.lock();
            graph.producers.drain().map(|(_, p)| p).collect()
        };
        for producer in producers {
            producer.stop();
        }
    }
}

impl NativeLayer for SoftLayer {
    fn create_component(&self, kind: &str) -> std::result::Result<ComponentInfo, Status> {
        let Some(kind) = Kind::parse(kind) else {
            return Err(mmal_sys::MMAL_ENOENT);
        };
        let handle = self.shared.next_handle();
        let name = kind.native_name();
        let (input_count, output_count) = kind.layout();

        let mut ports = Vec::new();
        let (control, port) =
            self.create_port(handle, name, PortDirection::Control, 0, PortFormat::default())?;
        ports.push((control.handle.0, port));
        let mut inputs = Vec::new();
        for index in 0..input_count {
            let (info, port) = self.create_port(
                handle,
                name,
                PortDirection::Input,
                index,
                default_format(Encoding::I420),
            )?;
            ports.push((info.handle.0, port));
            inputs.push(info);
        }
        let mut outputs = Vec::new();
        for index in 0..output_count {
            let (info, port) = self.create_port(
                handle,
                name,
                PortDirection::Output,
                index,
                default_format(kind.output_encoding()),
            )?;
            ports.push((info.handle.0, port));
            outputs.push(info);
        }

        let mut graph = self.shared.graph.lock();
        graph.components.insert(
            handle,
            SoftComponent {
                kind,
                ports: ports.iter().map(|(h, _)| *h).collect(),
                outputs: outputs.iter().map(|p| p.handle.0).collect(),
                enabled: false,
            },
        );
        graph.ports.extend(ports);
        debug!("Created {name} ({handle}).");
        Ok(ComponentInfo {
            handle: ComponentHandle(handle),
            name: name.to_string(),
            control,
            inputs,
            outputs,
        })
    }

    fn destroy_component(&self, component: ComponentHandle) -> Status {
        let mut leftovers = Leftovers::default();
        {
            let mut graph = self.shared.graph.lock();
            let Some(removed) = graph.components.remove(&component.0) else {
                return mmal_sys::MMAL_ENOENT;
            };
            for port in &removed.ports {
                graph.shut_port(*port, &mut leftovers);
                if let Some(p) = graph.ports.remove(port)
                    && let Some(connection) = p.connection
                {
                    warn!("{}: destroyed while still connected.", p.name);
                    graph.connections.remove(&connection);
                }
            }
        }
        leftovers.release();
        mmal_sys::MMAL_SUCCESS
    }

    fn enable_component(&self, component: ComponentHandle) -> Status {
        match self.shared.graph.lock().components.get_mut(&component.0) {
            Some(c) => {
                c.enabled = true;
                mmal_sys::MMAL_SUCCESS
            }
            None => mmal_sys::MMAL_ENOENT,
        }
    }

    fn disable_component(&self, component: ComponentHandle) -> Status {
        match self.shared.graph.lock().components.get_mut(&component.0) {
            Some(c) => {
                c.enabled = false;
                mmal_sys::MMAL_SUCCESS
            }
            None => mmal_sys::MMAL_ENOENT,
        }
    }

    fn commit_format(&self, port: PortHandle, format: &mut PortFormat) -> Status {
        let mut graph = self.shared.graph.lock();
        let Some(p) = graph.ports.get_mut(&port.0) else {
            return mmal_sys::MMAL_ENOENT;
        };
        if p.enabled || format.encoding == Encoding::UNKNOWN {
            return mmal_sys::MMAL_EINVAL;
        }
        apply_requirements(format);
        p.format = format.clone();
        mmal_sys::MMAL_SUCCESS
    }

    fn set_parameter(&self, port: PortHandle, id: u32, value: &ParameterValue) -> Status {
        {
            let mut graph = self.shared.graph.lock();
            let Some(p) = graph.ports.get_mut(&port.0) else {
                return mmal_sys::MMAL_ENOENT;
            };
            p.params.insert(id, value.clone());
        }
        match (id, value) {
            (mmal_sys::MMAL_PARAMETER_CAPTURE, ParameterValue::Bool(true)) => {
                self.shared.start_capture(port.0)
            }
            (mmal_sys::MMAL_PARAMETER_CAPTURE, ParameterValue::Bool(false)) => {
                self.shared.stop_capture(port.0)
            }
            (mmal_sys::MMAL_PARAMETER_CAPTURE, _) => mmal_sys::MMAL_EINVAL,
            _ => mmal_sys::MMAL_SUCCESS,
        }
    }

    fn get_parameter(&self, port: PortHandle, id: u32) -> std::result::Result<ParameterValue, Status> {
        let graph = self.shared.graph.lock();
        let p = graph.ports.get(&port.0).ok_or(mmal_sys::MMAL_ENOENT)?;
        p.params.get(&id).cloned().ok_or(mmal_sys::MMAL_ENOENT)
    }

    fn enable_port(&self, port: PortHandle, handler: Option<Arc<dyn BufferHandler>>) -> Status {
        let mut graph = self.shared.graph.lock();
        let Some(p) = graph.ports.get_mut(&port.0) else {
            return mmal_sys::MMAL_ENOENT;
        };
        if p.connection.is_some() {
            return mmal_sys::MMAL_EISCONN;
        }
        if p.enabled {
            return mmal_sys::MMAL_EINVAL;
        }
        p.enabled = true;
        p.handler = handler;
        trace!("{}: enabled.", p.name);
        mmal_sys::MMAL_SUCCESS
    }

    fn disable_port(&self, port: PortHandle) -> Status {
        let mut leftovers = Leftovers::default();
        {
            let mut graph = self.shared.graph.lock();
            if !graph.ports.contains_key(&port.0) {
                return mmal_sys::MMAL_ENOENT;
            }
            graph.shut_port(port.0, &mut leftovers);
        }
        leftovers.release();
        mmal_sys::MMAL_SUCCESS
    }

    fn send_buffer(&self, port: PortHandle, buffer: Buffer) -> Status {
        let mut graph = self.shared.graph.lock();
        let Some(p) = graph.ports.get_mut(&port.0) else {
            drop(graph);
            drop(buffer);
            return mmal_sys::MMAL_ENOENT;
        };
        if !p.enabled {
            drop(graph);
            drop(buffer);
            return mmal_sys::MMAL_EINVAL;
        }
        match p.direction {
            PortDirection::Output => {
                p.held.push_back(buffer);
                mmal_sys::MMAL_SUCCESS
            }
            PortDirection::Input => {
                let lane = p.lane.clone();
                drop(graph);
                let shared = Arc::clone(&self.shared);
                lane.submit(move || shared.consume_input(port.0, buffer));
                mmal_sys::MMAL_SUCCESS
            }
            PortDirection::Control => {
                drop(graph);
                drop(buffer);
                mmal_sys::MMAL_EINVAL
            }
        }
    }

    fn create_connection(
        &self,
        output: PortHandle,
        input: PortHandle,
        flags: u32,
    ) -> std::result::Result<ConnectionHandle, Status> {
        let mut graph = self.shared.graph.lock();
        let valid = |handle: u32, direction: PortDirection| {
            graph
                .ports
                .get(&handle)
                .map(|p| p.direction == direction && p.connection.is_none())
        };
        match (
            valid(output.0, PortDirection::Output),
            valid(input.0, PortDirection::Input),
        ) {
            (Some(true), Some(true)) => {}
            (Some(false), _) | (_, Some(false)) => return Err(mmal_sys::MMAL_EISCONN),
            _ => return Err(mmal_sys::MMAL_ENOENT),
        }
        let handle = self.shared.next_handle();
        graph.connections.insert(
            handle,
            SoftConnection {
                output: output.0,
                input: input.0,
                tunnelled: flags & mmal_sys::MMAL_CONNECTION_FLAG_TUNNELLING != 0,
                enabled: false,
                binding: None,
            },
        );
        for port in [output.0, input.0] {
            if let Some(p) = graph.ports.get_mut(&port) {
                p.connection = Some(handle);
            }
        }
        Ok(ConnectionHandle(handle))
    }

    fn enable_connection(
        &self,
        connection: ConnectionHandle,
        binding: Option<ConnectionBinding>,
    ) -> Status {
        let mut graph = self.shared.graph.lock();
        let Some(c) = graph.connections.get_mut(&connection.0) else {
            return mmal_sys::MMAL_ENOENT;
        };
        if c.enabled {
            return mmal_sys::MMAL_SUCCESS;
        }
        if !c.tunnelled && binding.is_none() {
            return mmal_sys::MMAL_EINVAL;
        }
        c.binding = binding;
        c.enabled = true;
        let ends = [c.output, c.input];
        for port in ends {
            if let Some(p) = graph.ports.get_mut(&port) {
                p.enabled = true;
            }
        }
        mmal_sys::MMAL_SUCCESS
    }

    fn disable_connection(&self, connection: ConnectionHandle) -> Status {
        let mut leftovers = Leftovers::default();
        {
            let mut graph = self.shared.graph.lock();
            let Some(c) = graph.connections.get_mut(&connection.0) else {
                return mmal_sys::MMAL_ENOENT;
            };
            c.enabled = false;
            c.binding = None;
            let ends = [c.output, c.input];
            for port in ends {
                graph.shut_port(port, &mut leftovers);
            }
        }
        leftovers.release();
        mmal_sys::MMAL_SUCCESS
    }

    fn destroy_connection(&self, connection: ConnectionHandle) -> Status {
        let status = self.disable_connection(connection);
        if status != mmal_sys::MMAL_SUCCESS {
            return status;
        }
        let mut graph = self.shared.graph.lock();
        if let Some(c) = graph.connections.remove(&connection.0) {
            for port in [c.output, c.input] {
                if let Some(p) = graph.ports.get_mut(&port) {
                    p.connection = None;
                }
            }
        }
        mmal_sys::MMAL_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_rejected() {
        let layer = SoftLayer::default();
        assert_eq!(
            layer.create_component("teleporter").unwrap_err(),
            mmal_sys::MMAL_ENOENT
        );
    }

    #[test]
    fn commit_reports_requirements() {
        let layer = SoftLayer::default();
        let camera = layer.create_component("camera").unwrap();
        assert_eq!(camera.outputs.len(), 3);

        let port = camera.outputs[0].handle;
        let mut format = camera.outputs[0].format.clone();
        format.encoding = Encoding::RGB24;
        format.width = 64;
        format.height = 32;
        format.buffer_num = 0;
        format.buffer_size = 0;
        assert_eq!(layer.commit_format(port, &mut format), mmal_sys::MMAL_SUCCESS);
        assert_eq!(format.buffer_size_min, 64 * 32 * 3);
        assert_eq!(format.buffer_num, format.buffer_num_recommended);

        format.encoding = Encoding::UNKNOWN;
        assert_eq!(layer.commit_format(port, &mut format), mmal_sys::MMAL_EINVAL);
    }

    #[test]
    fn flags_split_between_first_and_last_chunk() {
        let (first, last) = split_flags(
            BufferFlags::FRAME_START | BufferFlags::KEYFRAME | BufferFlags::FRAME_END,
        );
        assert_eq!(first, BufferFlags::FRAME_START | BufferFlags::KEYFRAME);
        assert_eq!(last, BufferFlags::FRAME_END);
    }

    #[test]
    fn send_to_disabled_port_returns_the_buffer() {
        let layer = SoftLayer::default();
        let sink = layer.create_component("null_sink").unwrap();
        let pool = crate::Pool::new("test", 1, 16).unwrap();
        let buffer = pool.queue().get().unwrap().unwrap();
        assert_eq!(
            layer.send_buffer(sink.inputs[0].handle, buffer),
            mmal_sys::MMAL_EINVAL
        );
        assert_eq!(pool.outstanding(), 0);
    }
}
