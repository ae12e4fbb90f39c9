// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The pipeline context and the capture orchestrator.

use std::{collections::HashSet, convert::Infallible, future::Future, sync::Arc, time::Duration};

use futures::{
    FutureExt,
    future::{self, BoxFuture},
};
use parking_lot::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    component::{Component, unwind},
    config::PipelineConfig,
    connection::{Connection, ConnectionMode},
    native::{NativeLayer, ParameterValue, PortDirection, soft::{SoftConfig, SoftLayer}},
    port::Port,
    trigger::{Completion, Trigger},
};

/// State shared by every object of one pipeline.
pub(crate) struct PipelineContext {
    pub(crate) native: Arc<dyn NativeLayer>,
    pub(crate) config: PipelineConfig,
    /// Serializes retrieval from input pools.
    pub(crate) input_lock: Mutex<()>,
    /// Serializes retrieval from output pools.
    pub(crate) output_lock: Mutex<()>,
}

/// A periodic side task run while a capture is in progress, for example an
/// annotation refresh.
struct RefreshTask {
    period: Duration,
    action: Box<dyn FnMut() + Send>,
}

/// Runs the refresh action on every tick until dropped. Never completes.
async fn run_refresh(task: Option<RefreshTask>) -> Infallible {
    let Some(RefreshTask { period, mut action }) = task.filter(|task| !task.period.is_zero())
    else {
        return future::pending().await;
    };
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        action();
    }
}

/// Options of a capture operation.
#[derive(Default)]
pub struct CaptureOptions {
    cancel: Option<BoxFuture<'static, ()>>,
    refresh: Option<RefreshTask>,
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the capture when `cancel` completes.
    pub fn with_cancel(mut self, cancel: impl Future<Output = ()> + Send + 'static) -> Self {
        self.cancel = Some(cancel.boxed());
        self
    }

    /// Cancels the capture after `duration`.
    pub fn with_duration(self, duration: Duration) -> Self {
        self.with_cancel(async move { time::sleep(duration).await })
    }

    /// Runs `action` every `period` while the capture is in progress.
    pub fn with_refresh(mut self, period: Duration, action: impl FnMut() + Send + 'static) -> Self {
        self.refresh = Some(RefreshTask {
            period,
            action: Box::new(action),
        });
        self
    }
}

/// Result of a capture operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    /// Outcome per waited port, by port name.
    pub outcomes: Vec<(String, Completion)>,
    /// Whether the capture was cancelled.
    pub cancelled: bool,
}

impl CaptureReport {
    /// Returns `true` if no port failed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_success())
    }
}

/// Graph reachable downstream of a source port.
struct Reach {
    components: Vec<Component>,
    connections: Vec<Connection>,
    ports: Vec<Port>,
}

/// An explicit pipeline context: the native layer, the configuration and the
/// components and connections created through it.
///
/// Dropping the pipeline tears the graph down.
pub struct Pipeline {
    context: Arc<PipelineContext>,
    components: Mutex<Vec<Component>>,
    connections: Mutex<Vec<Connection>>,
}

impl Pipeline {
    pub fn new(native: Arc<dyn NativeLayer>, config: PipelineConfig) -> Self {
        Self {
            context: Arc::new(PipelineContext {
                native,
                config,
                input_lock: Mutex::new(()),
                output_lock: Mutex::new(()),
            }),
            components: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// A pipeline over the software backend.
    pub fn with_soft_layer(soft: SoftConfig, config: PipelineConfig) -> Self {
        Self::new(Arc::new(SoftLayer::new(soft)), config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.context.config
    }

    pub fn native(&self) -> &Arc<dyn NativeLayer> {
        &self.context.native
    }

    /// Creates and enables a component of the given kind.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownComponent`] if the native layer has no such kind
    /// - [`Error::Native`] if creation or enabling fails
    pub fn create_component(&self, kind: &str) -> Result<Component> {
        let component = Component::create(self.context.clone(), kind)?;
        self.components.lock().push(component.clone());
        Ok(component)
    }

    pub fn components(&self) -> Vec<Component> {
        self.components.lock().clone()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.lock().clone()
    }

    pub fn find_component(&self, id: Uuid) -> Option<Component> {
        self.components.lock().iter().find(|c| c.id() == id).cloned()
    }

    /// The connection attached to `port`, if any.
    pub fn connection_of(&self, port: &Port) -> Option<Connection> {
        let id = port.connection_id()?;
        self.connections.lock().iter().find(|c| c.id() == id).cloned()
    }

    /// Connects an output port to an input port.
    ///
    /// The input adopts the output's format. Connecting an output that is
    /// already connected logs a warning and returns the existing connection.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArg`] if the ports have the wrong direction or do not
    ///   belong to this pipeline
    /// - [`Error::AlreadyConnected`] if the input is already connected
    /// - [`Error::Native`] if the native layer refuses
    pub fn connect(&self, output: &Port, input: &Port, mode: ConnectionMode) -> Result<Connection> {
        if let Some(existing) = self.connection_of(output) {
            warn!(
                "{}: already connected, returning the existing connection.",
                output.name()
            );
            return Ok(existing);
        }
        if output.direction() != PortDirection::Output || input.direction() != PortDirection::Input {
            return Err(Error::InvalidArg(format!(
                "cannot connect {} ({}) to {} ({})",
                output.name(),
                output.direction(),
                input.name(),
                input.direction()
            )));
        }
        if input.is_connected() {
            return Err(Error::AlreadyConnected(input.name().to_string()));
        }
        let owner = |port: &Port| {
            self.find_component(port.component_id()).ok_or_else(|| {
                Error::InvalidArg(format!("{} is not part of this pipeline", port.name()))
            })
        };
        let upstream = owner(output)?;
        let downstream = owner(input)?;

        let connection = Connection::create(
            self.context.clone(),
            upstream,
            output.clone(),
            downstream,
            input.clone(),
            mode,
        )?;
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    /// Destroys a connection and forgets it.
    pub fn disconnect(&self, connection: &Connection) -> Result<()> {
        self.connections.lock().retain(|c| c.id() != connection.id());
        connection.destroy()
    }

    /// Walks the graph downstream of `source`.
    fn reach(&self, source: &Port) -> Reach {
        let mut reach = Reach {
            components: Vec::new(),
            connections: Vec::new(),
            ports: Vec::new(),
        };
        if let Some(component) = self.find_component(source.component_id()) {
            reach.components.push(component);
        }
        let mut visited = HashSet::new();
        let mut frontier: Vec<Connection> = self.connection_of(source).into_iter().collect();
        while let Some(connection) = frontier.pop() {
            let downstream = connection.downstream().clone();
            reach.connections.push(connection);
            if !visited.insert(downstream.id()) {
                continue;
            }
            reach.ports.extend(downstream.processing_ports());
            for output in downstream.outputs() {
                if let Some(next) = self.connection_of(output) {
                    frontier.push(next);
                }
            }
            reach.components.push(downstream);
        }
        reach
    }

    /// Runs a capture from `source` until every involved port finishes.
    ///
    /// The ports waited on are the unconnected, handler-carrying outputs
    /// downstream of `source`; with none, `source` itself is captured.
    /// Connections on the path that are not yet enabled are enabled for the
    /// duration of the capture. When the cancel future of `options`
    /// completes, every involved component is force stopped; ports that do
    /// not observe the stop within the grace period are resolved directly.
    ///
    /// # Errors
    ///
    /// Any failure while enabling aborts the capture after unwinding what was
    /// enabled, in reverse order. Failures while disabling are reported after
    /// every port and connection has been given a chance to shut down.
    pub async fn capture(&self, source: &Port, options: CaptureOptions) -> Result<CaptureReport> {
        if source.direction() != PortDirection::Output {
            return Err(Error::InvalidArg(format!(
                "{}: captures start from an output port",
                source.name()
            )));
        }
        let reach = self.reach(source);
        let mut ports = reach.ports;
        if ports.is_empty() {
            if source.is_connected() {
                return Err(Error::InvalidArg(format!(
                    "{}: nothing downstream has a capture handler",
                    source.name()
                )));
            }
            debug!("{}: no downstream handlers, capturing raw output.", source.name());
            ports.push(source.clone());
        }
        for component in &reach.components {
            component.set_force_stop(false);
        }

        let mut started: Vec<Port> = Vec::new();
        let mut triggers: Vec<Trigger> = Vec::new();
        for port in &ports {
            match port.start() {
                Ok(trigger) => {
                    triggers.push(trigger);
                    started.push(port.clone());
                }
                Err(err) => {
                    unwind(&started.iter().collect::<Vec<_>>());
                    return Err(err);
                }
            }
        }

        let mut enabled: Vec<Connection> = Vec::new();
        for connection in &reach.connections {
            if connection.is_enabled() {
                continue;
            }
            if let Err(err) = connection.enable() {
                unwind(&enabled.iter().collect::<Vec<_>>());
                unwind(&started.iter().collect::<Vec<_>>());
                return Err(err);
            }
            enabled.push(connection.clone());
        }

        let warm_up = self.context.config.warm_up();
        if !warm_up.is_zero() {
            time::sleep(warm_up).await;
        }
        if let Err(err) = source.set_parameter(mmal_sys::MMAL_PARAMETER_CAPTURE, ParameterValue::Bool(true)) {
            unwind(&enabled.iter().collect::<Vec<_>>());
            unwind(&started.iter().collect::<Vec<_>>());
            return Err(err);
        }
        info!("{}: capture started, waiting on {} port(s).", source.name(), triggers.len());

        let refresh = run_refresh(options.refresh);
        let waits = future::join_all(triggers.iter().map(Trigger::wait));
        let cancel = options.cancel.unwrap_or_else(|| future::pending().boxed());
        tokio::pin!(refresh, waits);

        let finished = tokio::select! {
            outcomes = &mut waits => Some(outcomes),
            () = cancel => None,
            never = &mut refresh => match never {},
        };
        let cancelled = finished.is_none();
        let outcomes = match finished {
            Some(outcomes) => outcomes,
            None => {
                info!("{}: capture cancelled, force stopping.", source.name());
                for component in &reach.components {
                    component.set_force_stop(true);
                }
                let grace = self.context.config.force_stop_grace();
                tokio::select! {
                    outcomes = &mut waits => outcomes,
                    () = time::sleep(grace) => {
                        warn!(
                            "{}: force stop not observed within {grace:?}, resolving pending ports.",
                            source.name()
                        );
                        for port in &started {
                            port.finish(Completion::ForceStopped);
                        }
                        triggers
                            .iter()
                            .map(|t| t.outcome().unwrap_or(Completion::ForceStopped))
                            .collect()
                    }
                    never = &mut refresh => match never {},
                }
            }
        };

        let mut first_error = None;
        if let Err(err) = source.set_parameter(mmal_sys::MMAL_PARAMETER_CAPTURE, ParameterValue::Bool(false)) {
            warn!("{err}");
            first_error.get_or_insert(err);
        }
        for port in started.iter().rev() {
            if let Err(err) = port.disable() {
                warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        for component in &reach.components {
            if let Err(err) = component.clean_port_pools() {
                warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        for connection in enabled.iter().rev() {
            if let Err(err) = connection.disable() {
                warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let report = CaptureReport {
            outcomes: started
                .iter()
                .map(|port| port.name().to_string())
                .zip(outcomes)
                .collect(),
            cancelled,
        };
        info!("{}: capture finished: {:?}", source.name(), report.outcomes);
        Ok(report)
    }

    /// Logs the components and connections of the pipeline.
    pub fn print_pipeline(&self) {
        info!("Current pipeline:");
        for component in self.components.lock().iter() {
            info!("{component}");
        }
        for connection in self.connections.lock().iter() {
            info!("{connection}");
        }
    }

    /// Destroys every connection, newest first, then every component.
    ///
    /// # Errors
    ///
    /// Returns the first failure; teardown continues past it.
    pub fn teardown(&self) -> Result<()> {
        let mut first_error = None;
        let connections: Vec<Connection> = self.connections.lock().drain(..).collect();
        for connection in connections.iter().rev() {
            if let Err(err) = connection.destroy() {
                warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        let components: Vec<Component> = self.components.lock().drain(..).collect();
        for component in components.iter().rev() {
            if let Err(err) = component.destroy() {
                warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::error!("Pipeline teardown failed: {err}");
        }
    }
}
