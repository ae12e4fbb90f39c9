// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer flow tests against a scripted native layer.
//!
//! The scripted layer never produces data on its own: each test decides which
//! buffer comes back from which port and with which flags, and the callback
//! runs synchronously on the test thread. This makes the port and connection
//! callback contracts observable step by step.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use mmal::{
    Buffer, BufferFlags, CaptureHandler, CaptureMode, CaptureOptions, Completion, ConnectionListener,
    ConnectionMode, Encoding, Error, NativeLayer, Pipeline, PortConfig, PortFormat, PortState,
    config::PipelineConfig,
    native::{
        BufferHandler, ComponentHandle, ComponentInfo, ConnectionBinding, ConnectionHandle,
        ParameterValue, PortDirection, PortHandle, PortInfo,
    },
};
use parking_lot::Mutex;
use tracing::info;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn setup_test() -> (Arc<ScriptedLayer>, Pipeline) {
    setup_with(PipelineConfig {
        drain_timeout_ms: 500,
        ..PipelineConfig::default()
    })
}

fn setup_with(config: PipelineConfig) -> (Arc<ScriptedLayer>, Pipeline) {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
    let layer = Arc::new(ScriptedLayer::default());
    let pipeline = Pipeline::new(layer.clone(), config);
    (layer, pipeline)
}

struct ScriptedPort {
    name: String,
    direction: PortDirection,
    enabled: bool,
    handler: Option<Arc<dyn BufferHandler>>,
    held: VecDeque<Buffer>,
    connection: Option<u32>,
    params: HashMap<u32, ParameterValue>,
}

struct ScriptedConnection {
    ports: [u32; 2],
    binding: Option<ConnectionBinding>,
}

#[derive(Default)]
struct ScriptedState {
    ports: HashMap<u32, ScriptedPort>,
    by_name: HashMap<String, u32>,
    connections: HashMap<u32, ScriptedConnection>,
}

/// Native layer whose buffer traffic is driven by the test.
#[derive(Default)]
struct ScriptedLayer {
    state: Mutex<ScriptedState>,
    next: AtomicU32,
    /// Ports whose enable (directly or through a connection) fails.
    refused: Mutex<HashSet<String>>,
    /// Names of the ports disabled so far, in order.
    disabled: Mutex<Vec<String>>,
}

enum Delivery {
    Handler(Arc<dyn BufferHandler>),
    Connection(ConnectionBinding),
}

impl ScriptedLayer {
    fn id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn port_info(&self, component: &str, direction: PortDirection, index: usize) -> PortInfo {
        let handle = self.id();
        let tag = match direction {
            PortDirection::Control => "ctr",
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        let name = format!("{component}:{tag}:{index}");
        let mut state = self.state.lock();
        state.by_name.insert(name.clone(), handle);
        state.ports.insert(
            handle,
            ScriptedPort {
                name: name.clone(),
                direction,
                enabled: false,
                handler: None,
                held: VecDeque::new(),
                connection: None,
                params: HashMap::new(),
            },
        );
        PortInfo {
            handle: PortHandle(handle),
            name,
            direction,
            index,
            format: PortFormat::default(),
        }
    }

    fn refuse(&self, port: &str) {
        self.refused.lock().insert(port.to_string());
    }

    fn is_refused(&self, state: &ScriptedState, port: u32) -> bool {
        state
            .ports
            .get(&port)
            .is_some_and(|p| self.refused.lock().contains(&p.name))
    }

    fn disabled(&self) -> Vec<String> {
        self.disabled.lock().clone()
    }

    /// Number of buffers the port currently holds.
    fn held(&self, port: &str) -> usize {
        let state = self.state.lock();
        let handle = state.by_name[port];
        state.ports[&handle].held.len()
    }

    fn take_held(&self, port: &str) -> Option<Buffer> {
        let mut state = self.state.lock();
        let handle = state.by_name[port];
        state.ports.get_mut(&handle)?.held.pop_front()
    }

    /// Where a buffer returned by `port` goes.
    fn delivery(&self, port: &str) -> Option<Delivery> {
        let state = self.state.lock();
        let p = &state.ports[&state.by_name[port]];
        if let Some(binding) = p
            .connection
            .and_then(|id| state.connections.get(&id))
            .and_then(|c| c.binding.clone())
        {
            return Some(Delivery::Connection(binding));
        }
        p.handler.clone().map(Delivery::Handler)
    }

    /// Fills a held output buffer and returns it to the core.
    fn emit(&self, port: &str, payload: &[u8], flags: BufferFlags) -> bool {
        self.emit_with(port, |buffer| {
            buffer.write_payload(payload);
            buffer.set_flags(flags);
        })
    }

    fn emit_event(&self, port: &str, command: u32) -> bool {
        self.emit_with(port, |buffer| buffer.set_command(command))
    }

    fn emit_with(&self, port: &str, fill: impl FnOnce(&mut Buffer)) -> bool {
        let Some(mut buffer) = self.take_held(port) else {
            return false;
        };
        fill(&mut buffer);
        match self.delivery(port) {
            Some(Delivery::Handler(handler)) => handler.on_buffer(buffer),
            Some(Delivery::Connection(binding)) => {
                binding.queue.put(buffer);
                binding.handler.on_ready();
            }
            None => drop(buffer),
        }
        true
    }

    /// Hands a consumed input buffer back to the core.
    fn return_input(&self, port: &str, buffer: Buffer) {
        match self.delivery(port) {
            Some(Delivery::Handler(handler)) => handler.on_buffer(buffer),
            Some(Delivery::Connection(binding)) => {
                drop(buffer);
                binding.handler.on_ready();
            }
            None => drop(buffer),
        }
    }

    /// Releases every buffer the port holds.
    fn flush(&self, port: &str) {
        let held: Vec<Buffer> = {
            let mut state = self.state.lock();
            let handle = state.by_name[port];
            state.ports.get_mut(&handle).map(|p| p.held.drain(..).collect()).unwrap_or_default()
        };
        drop(held);
    }

    fn shut(&self, handles: &[u32]) {
        let held: Vec<Buffer> = {
            let mut state = self.state.lock();
            let mut held = Vec::new();
            for handle in handles {
                if let Some(p) = state.ports.get_mut(handle) {
                    p.enabled = false;
                    p.handler = None;
                    held.extend(p.held.drain(..));
                }
            }
            held
        };
        drop(held);
    }
}

impl NativeLayer for ScriptedLayer {
    fn create_component(&self, kind: &str) -> Result<ComponentInfo, u32> {
        let (inputs, outputs) = match kind {
            "source" => (0, 1),
            "sink" => (1, 0),
            "filter" => (1, 1),
            "tee" => (1, 2),
            _ => return Err(mmal_sys::MMAL_ENOENT),
        };
        let handle = self.id();
        Ok(ComponentInfo {
            handle: ComponentHandle(handle),
            name: kind.to_string(),
            control: self.port_info(kind, PortDirection::Control, 0),
            inputs: (0..inputs)
                .map(|i| self.port_info(kind, PortDirection::Input, i))
                .collect(),
            outputs: (0..outputs)
                .map(|i| self.port_info(kind, PortDirection::Output, i))
                .collect(),
        })
    }

    fn destroy_component(&self, _component: ComponentHandle) -> u32 {
        mmal_sys::MMAL_SUCCESS
    }

    fn enable_component(&self, _component: ComponentHandle) -> u32 {
        mmal_sys::MMAL_SUCCESS
    }

    fn disable_component(&self, _component: ComponentHandle) -> u32 {
        mmal_sys::MMAL_SUCCESS
    }

    fn commit_format(&self, _port: PortHandle, format: &mut PortFormat) -> u32 {
        if format.encoding == Encoding::UNKNOWN {
            return mmal_sys::MMAL_EINVAL;
        }
        format.buffer_num_min = 2;
        format.buffer_num_recommended = 4;
        format.buffer_size_min = 1024;
        format.buffer_size_recommended = 4096;
        mmal_sys::MMAL_SUCCESS
    }

    fn set_parameter(&self, port: PortHandle, id: u32, value: &ParameterValue) -> u32 {
        match self.state.lock().ports.get_mut(&port.0) {
            Some(p) => {
                p.params.insert(id, value.clone());
                mmal_sys::MMAL_SUCCESS
            }
            None => mmal_sys::MMAL_ENOENT,
        }
    }

    fn get_parameter(&self, port: PortHandle, id: u32) -> Result<ParameterValue, u32> {
        let state = self.state.lock();
        let p = state.ports.get(&port.0).ok_or(mmal_sys::MMAL_ENOENT)?;
        p.params.get(&id).cloned().ok_or(mmal_sys::MMAL_ENOENT)
    }

    fn enable_port(&self, port: PortHandle, handler: Option<Arc<dyn BufferHandler>>) -> u32 {
        let mut state = self.state.lock();
        if self.is_refused(&state, port.0) {
            return mmal_sys::MMAL_ENOSPC;
        }
        let Some(p) = state.ports.get_mut(&port.0) else {
            return mmal_sys::MMAL_ENOENT;
        };
        p.enabled = true;
        p.handler = handler;
        mmal_sys::MMAL_SUCCESS
    }

    fn disable_port(&self, port: PortHandle) -> u32 {
        if let Some(p) = self.state.lock().ports.get(&port.0) {
            self.disabled.lock().push(p.name.clone());
        }
        self.shut(&[port.0]);
        mmal_sys::MMAL_SUCCESS
    }

    fn send_buffer(&self, port: PortHandle, buffer: Buffer) -> u32 {
        let mut state = self.state.lock();
        match state.ports.get_mut(&port.0) {
            Some(p) if p.enabled => {
                p.held.push_back(buffer);
                mmal_sys::MMAL_SUCCESS
            }
            _ => mmal_sys::MMAL_EINVAL,
        }
    }

    fn create_connection(
        &self,
        output: PortHandle,
        input: PortHandle,
        _flags: u32,
    ) -> Result<ConnectionHandle, u32> {
        let handle = self.id();
        let mut state = self.state.lock();
        for port in [output.0, input.0] {
            if let Some(p) = state.ports.get_mut(&port) {
                p.connection = Some(handle);
            }
        }
        state.connections.insert(
            handle,
            ScriptedConnection {
                ports: [output.0, input.0],
                binding: None,
            },
        );
        Ok(ConnectionHandle(handle))
    }

    fn enable_connection(
        &self,
        connection: ConnectionHandle,
        binding: Option<ConnectionBinding>,
    ) -> u32 {
        let mut state = self.state.lock();
        let Some(ports) = state.connections.get(&connection.0).map(|c| c.ports) else {
            return mmal_sys::MMAL_ENOENT;
        };
        if ports.iter().any(|&port| self.is_refused(&state, port)) {
            return mmal_sys::MMAL_ENOSPC;
        }
        let Some(c) = state.connections.get_mut(&connection.0) else {
            return mmal_sys::MMAL_ENOENT;
        };
        c.binding = binding;
        let ports = c.ports;
        for port in ports {
            if let Some(p) = state.ports.get_mut(&port) {
                p.enabled = true;
            }
        }
        mmal_sys::MMAL_SUCCESS
    }

    fn disable_connection(&self, connection: ConnectionHandle) -> u32 {
        let ports = {
            let mut state = self.state.lock();
            let Some(c) = state.connections.get_mut(&connection.0) else {
                return mmal_sys::MMAL_ENOENT;
            };
            c.binding = None;
            c.ports
        };
        self.shut(&ports);
        mmal_sys::MMAL_SUCCESS
    }

    fn destroy_connection(&self, connection: ConnectionHandle) -> u32 {
        let mut state = self.state.lock();
        if let Some(c) = state.connections.remove(&connection.0) {
            for port in c.ports {
                if let Some(p) = state.ports.get_mut(&port) {
                    p.connection = None;
                }
            }
        }
        mmal_sys::MMAL_SUCCESS
    }
}

/// Capture handler recording what it sees.
#[derive(Default)]
struct Recorder {
    payloads: Mutex<Vec<Vec<u8>>>,
    ends: AtomicUsize,
}

impl CaptureHandler for Recorder {
    fn on_data_available(&self, data: &[u8], _end_of_frame: bool) {
        self.payloads.lock().push(data.to_vec());
    }

    fn on_stream_end(&self, _completion: Completion) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConnectionListener for Recorder {
    fn on_input(&self, data: &[u8]) {
        self.payloads.lock().push(data.to_vec());
    }
}

const SOURCE_OUT: &str = "source:out:0";

#[test]
fn end_of_stream_after_three_buffers() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();
    port.configure(PortConfig::new(Encoding::H264).with_buffers(4, 0))
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    port.set_capture_handler(recorder.clone());
    let trigger = port.start().unwrap();
    let pool = port.pool().unwrap();
    assert_eq!(pool.header_count(), 4);
    assert_eq!(layer.held(SOURCE_OUT), 4);

    for i in 0..3u8 {
        assert!(layer.emit(SOURCE_OUT, &[i; 16], BufferFlags::NONE));
        assert_eq!(layer.held(SOURCE_OUT), 4, "replacement sent after buffer {i}");
    }
    assert!(!trigger.is_completed());
    assert!(layer.emit(SOURCE_OUT, &[], BufferFlags::END_OF_STREAM));

    assert_eq!(recorder.payloads.lock().len(), 3);
    assert_eq!(trigger.outcome(), Some(Completion::EndOfStream));
    assert!(!trigger.signal(Completion::Failed));
    assert_eq!(trigger.outcome(), Some(Completion::EndOfStream));
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);

    // The terminal buffer is not replaced.
    assert_eq!(layer.held(SOURCE_OUT), 3);
    layer.flush(SOURCE_OUT);
    assert_eq!(pool.queue().len(), 4);
    assert_eq!(pool.outstanding(), 0);

    port.disable().unwrap();
    assert!(port.pool().is_none());
    assert!(pool.is_destroyed());
    info!("Pool drained and destroyed after end of stream.");
}

#[test]
fn force_stop_resolves_on_next_buffer() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();
    port.configure(PortConfig::new(Encoding::H264).with_capture_mode(CaptureMode::Continuous))
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    port.set_capture_handler(recorder.clone());
    let trigger = port.start().unwrap();

    assert!(layer.emit(SOURCE_OUT, b"one", BufferFlags::FRAME_END));
    assert!(layer.emit(SOURCE_OUT, b"two", BufferFlags::NONE));
    assert!(!trigger.is_completed());

    source.set_force_stop(true);
    assert!(layer.emit(SOURCE_OUT, b"three", BufferFlags::NONE));
    assert_eq!(trigger.outcome(), Some(Completion::ForceStopped));
    assert_eq!(*recorder.payloads.lock(), vec![b"one".to_vec(), b"two".to_vec()]);

    port.disable().unwrap();
}

#[test]
fn deadline_and_failures_are_terminal() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();
    port.configure(PortConfig::new(Encoding::MJPEG)).unwrap();
    let recorder = Arc::new(Recorder::default());
    port.set_capture_handler(recorder.clone());

    port.set_timeout(Some(Duration::ZERO));
    let trigger = port.start().unwrap();
    assert!(layer.emit(SOURCE_OUT, b"late", BufferFlags::NONE));
    assert_eq!(trigger.outcome(), Some(Completion::TimedOut));
    port.disable().unwrap();

    port.set_timeout(None);
    let trigger = port.start().unwrap();
    assert!(layer.emit(
        SOURCE_OUT,
        b"broken",
        BufferFlags::TRANSMISSION_FAILED
    ));
    assert_eq!(trigger.outcome(), Some(Completion::Failed));
    // A failed buffer is still replaced while the port is enabled.
    assert_eq!(layer.held(SOURCE_OUT), 4);
    port.disable().unwrap();

    let trigger = port.start().unwrap();
    assert!(layer.emit_event(SOURCE_OUT, mmal_sys::MMAL_EVENT_ERROR));
    assert_eq!(trigger.outcome(), Some(Completion::Failed));
    port.disable().unwrap();

    assert!(recorder.payloads.lock().is_empty());
}

#[test]
fn callback_connection_routes_each_buffer_once() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let sink = pipeline.create_component("sink").unwrap();
    let output = source.output(0).unwrap();
    let input = sink.input(0).unwrap();
    output
        .configure(PortConfig::new(Encoding::I420).with_resolution(32, 16).with_buffers(2, 0))
        .unwrap();

    let connection = pipeline
        .connect(output, input, ConnectionMode::CallbackDriven)
        .unwrap();
    assert_eq!(input.format().encoding, Encoding::I420);
    let listener = Arc::new(Recorder::default());
    connection.set_listener(listener.clone());
    connection.enable().unwrap();

    let pool = connection.pool().unwrap().clone();
    assert_eq!(layer.held(SOURCE_OUT), 2);
    assert!(output.pool().is_none());
    assert!(input.pool().is_none());

    assert!(layer.emit(SOURCE_OUT, b"hello", BufferFlags::FRAME_END));
    assert_eq!(*listener.payloads.lock(), vec![b"hello".to_vec()]);
    assert_eq!(layer.held("sink:in:0"), 1);

    let consumed = layer.take_held("sink:in:0").unwrap();
    assert!(pool.owns(&consumed));
    assert_eq!(consumed.to_vec(), b"hello");
    layer.return_input("sink:in:0", consumed);

    // Back in its own pool, then handed to the upstream output again.
    assert_eq!(layer.held(SOURCE_OUT), 2);
    assert_eq!(listener.payloads.lock().len(), 1);
    assert_eq!(pool.outstanding(), 2);

    connection.disable().unwrap();
    assert_eq!(pool.outstanding(), 0);
    pipeline.teardown().unwrap();
    assert!(pool.is_destroyed());
}

#[test]
fn configure_negotiates_buffers_and_restores_on_failure() {
    let (_layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();

    let format = port
        .configure(PortConfig::new(Encoding::I420).with_resolution(100, 50))
        .unwrap();
    assert_eq!((format.width, format.height), (128, 64));
    assert_eq!((format.crop.width, format.crop.height), (100, 50));
    assert!(format.buffer_size >= format.buffer_size_recommended);
    assert!(format.buffer_num >= format.buffer_num_min);
    assert_eq!(port.format(), format);

    let format = port
        .configure(PortConfig::new(Encoding::I420).with_buffers(1, 10))
        .unwrap();
    assert_eq!(format.buffer_num, 2);
    assert_eq!(format.buffer_size, 1024);

    let before = port.format();
    let err = port
        .configure(PortConfig::new(Encoding::UNKNOWN))
        .unwrap_err();
    assert_eq!(err.status(), Some(mmal_sys::MMAL_EINVAL));
    assert_eq!(port.format(), before);

    let oversized = port.configure(PortConfig::new(Encoding::I420).with_resolution(u32::MAX - 3, 16));
    assert!(matches!(oversized, Err(Error::InvalidArg(_))));
    assert_eq!(port.format(), before);
}

#[test]
fn invalid_transitions_are_rejected() {
    let (_layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();

    assert!(matches!(port.enable(), Err(Error::MissingPool(_))));
    assert_eq!(port.state(), PortState::Disabled);

    port.configure(PortConfig::new(Encoding::H264)).unwrap();
    let trigger = port.start().unwrap();
    assert!(matches!(port.start(), Err(Error::InvalidState { .. })));
    // The running operation keeps its trigger.
    assert!(trigger.signal(Completion::Failed));
    assert_eq!(
        port.trigger().and_then(|t| t.outcome()),
        Some(Completion::Failed)
    );
    port.disable().unwrap();

    port.enable().unwrap();
    port.enable().unwrap();
    assert!(matches!(
        port.configure(PortConfig::new(Encoding::H264)),
        Err(Error::InvalidState { .. })
    ));
    port.disable().unwrap();
    port.disable().unwrap();

    let sink = pipeline.create_component("sink").unwrap();
    let connection = pipeline
        .connect(port, sink.input(0).unwrap(), ConnectionMode::Tunnelled)
        .unwrap();
    assert!(matches!(port.enable(), Err(Error::InvalidState { .. })));
    let again = pipeline
        .connect(port, sink.input(0).unwrap(), ConnectionMode::Tunnelled)
        .unwrap();
    assert_eq!(again.id(), connection.id());

    assert!(matches!(
        pipeline.create_component("teleporter"),
        Err(Error::UnknownComponent(_))
    ));
}

#[test]
fn fed_input_resolves_on_end_of_stream() {
    let (layer, pipeline) = setup_test();
    let sink = pipeline.create_component("sink").unwrap();
    let input = sink.input(0).unwrap();
    input
        .configure(PortConfig::new(Encoding::H264).with_buffers(2, 1024))
        .unwrap();
    let trigger = input.start().unwrap();

    input.feed(&[7; 1500], true).unwrap();
    assert_eq!(layer.held("sink:in:0"), 2);

    let first = layer.take_held("sink:in:0").unwrap();
    let last = layer.take_held("sink:in:0").unwrap();
    assert_eq!(first.length(), 1024);
    assert!(!first.has_flags(BufferFlags::END_OF_STREAM));
    assert_eq!(last.length(), 476);
    assert!(last.has_flags(BufferFlags::END_OF_STREAM));

    layer.return_input("sink:in:0", first);
    assert!(!trigger.is_completed());
    layer.return_input("sink:in:0", last);
    assert_eq!(trigger.outcome(), Some(Completion::EndOfStream));

    input.disable().unwrap();
}

#[test]
fn disable_keeps_pool_with_buffers_out() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();
    port.configure(PortConfig::new(Encoding::H264).with_buffers(2, 0))
        .unwrap();
    port.start().unwrap();
    let in_flight = layer.take_held(SOURCE_OUT).unwrap();

    let err = port.disable().unwrap_err();
    assert!(matches!(
        err,
        Error::PoolNotDrained {
            headers: 2,
            outstanding: 1,
            ..
        }
    ));
    assert_eq!(port.state(), PortState::Disabled);
    let pool = port.pool().unwrap();
    assert!(!pool.is_destroyed());
    assert!(matches!(
        port.clean_pool(),
        Err(Error::PoolNotDrained { .. })
    ));

    drop(in_flight);
    assert_eq!(pool.outstanding(), 0);
    port.clean_pool().unwrap();
    assert!(port.pool().is_none());
    assert!(pool.is_destroyed());
}

#[test]
fn draining_port_does_not_stall_other_ports() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let filter = pipeline.create_component("filter").unwrap();
    let draining = source.output(0).unwrap();
    let busy = filter.output(0).unwrap();
    for port in [draining, busy] {
        port.configure(PortConfig::new(Encoding::H264).with_buffers(2, 0))
            .unwrap();
        port.set_capture_handler(Arc::new(Recorder::default()));
        port.start().unwrap();
    }
    let in_flight = layer.take_held(SOURCE_OUT).unwrap();

    thread::scope(|scope| {
        let disabling = scope.spawn(|| draining.disable());
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        assert!(layer.emit("filter:out:0", b"data", BufferFlags::NONE));
        let stalled = started.elapsed();
        assert!(
            stalled < Duration::from_millis(250),
            "callback waited {stalled:?} on a draining port"
        );
        assert_eq!(layer.held("filter:out:0"), 2);

        drop(in_flight);
        disabling.join().unwrap().unwrap();
    });
    assert!(draining.pool().is_none());
    busy.disable().unwrap();
}

#[tokio::test]
async fn unobserved_force_stop_resolves_after_grace() {
    let (layer, pipeline) = setup_with(PipelineConfig {
        drain_timeout_ms: 500,
        force_stop_grace_ms: 50,
        ..PipelineConfig::default()
    });
    let source = pipeline.create_component("source").unwrap();
    let port = source.output(0).unwrap();
    port.configure(PortConfig::new(Encoding::H264).with_capture_mode(CaptureMode::Continuous))
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    port.set_capture_handler(recorder.clone());

    // Nothing is ever emitted, so no callback can observe the stop.
    let report = pipeline
        .capture(port, CaptureOptions::new().with_cancel(async {}))
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(
        report.outcomes,
        vec![(SOURCE_OUT.to_string(), Completion::ForceStopped)]
    );
    assert_eq!(recorder.ends.load(Ordering::SeqCst), 1);
    assert!(port.pool().is_none());
    assert_eq!(layer.held(SOURCE_OUT), 0);
}

#[test]
fn failed_port_enable_unwinds_in_reverse() {
    let (layer, pipeline) = setup_test();
    let tee = pipeline.create_component("tee").unwrap();
    let ports: Vec<_> = tee.ports().cloned().collect();
    for port in &ports {
        if port.direction() != PortDirection::Control {
            port.configure(PortConfig::new(Encoding::I420)).unwrap();
        }
    }
    layer.refuse("tee:out:1");

    let err = tee.enable_ports().unwrap_err();
    assert_eq!(err.status(), Some(mmal_sys::MMAL_ENOSPC));
    assert_eq!(layer.disabled(), vec!["tee:out:0", "tee:in:0"]);
    for port in &ports {
        assert_eq!(port.state(), PortState::Disabled);
        assert!(port.pool().is_none());
    }
}

#[tokio::test]
async fn failed_connection_enable_unwinds_started_ports() {
    let (layer, pipeline) = setup_test();
    let source = pipeline.create_component("source").unwrap();
    let filter = pipeline.create_component("filter").unwrap();
    let video = source.output(0).unwrap();
    video.configure(PortConfig::new(Encoding::I420)).unwrap();
    let connection = pipeline
        .connect(video, filter.input(0).unwrap(), ConnectionMode::Tunnelled)
        .unwrap();
    let output = filter.output(0).unwrap();
    output.configure(PortConfig::new(Encoding::H264)).unwrap();
    output.set_capture_handler(Arc::new(Recorder::default()));
    layer.refuse("filter:in:0");

    let err = pipeline
        .capture(video, CaptureOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(mmal_sys::MMAL_ENOSPC));
    assert!(!connection.is_enabled());
    assert_eq!(layer.disabled(), vec!["filter:out:0"]);
    assert_eq!(output.state(), PortState::Disabled);
    assert!(output.pool().is_none());
    assert_eq!(layer.held("filter:out:0"), 0);
}
