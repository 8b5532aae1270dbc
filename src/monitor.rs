// src/monitor.rs
//! Top-level wiring: discovery, acquisition and both stream sessions
//!
//! The monitor runs a single event loop task. It consumes every
//! [`StreamEvent`] the fallback chain produces and, on a fixed tick,
//! re-evaluates both trackers. Connection changes go out on a broadcast
//! channel; the latest thermal display frame is published on a watch channel.

use crate::config::{ConnectionMode, TelemetryConfig};
use crate::discovery::DeviceDiscovery;
use crate::error::{TelemetryError, TelemetryResult};
use crate::processing::thermal::DisplayFrame;
use crate::session::{MuscleSession, StreamSession, ThermalSession};
use crate::transport::simulated::{SimulatedMuscleSource, SimulatedThermalSource};
use crate::transport::{http_transports, ChainSettings, FallbackChain, StreamEvent, StreamTransports};
use crate::types::{ConnectionState, SensorKind, StateChange};
use crate::utils::time::TimeProvider;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Point-in-time view of both streams
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub sensor_host: Option<String>,
    pub muscle: ConnectionState,
    pub thermal: ConnectionState,
    pub muscle_samples: usize,
    pub thermal_sensor: Option<String>,
    pub parse_errors: u64,
}

pub struct TelemetryMonitor {
    config: TelemetryConfig,
    clock: Arc<dyn TimeProvider>,
    muscle: Arc<Mutex<MuscleSession>>,
    thermal: Arc<Mutex<ThermalSession>>,
    chain: Option<FallbackChain>,
    event_loop: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    changes: broadcast::Sender<StateChange>,
    frames: Arc<watch::Sender<Option<DisplayFrame>>>,
    sensor_host: Option<String>,
}

impl TelemetryMonitor {
    pub fn new(config: TelemetryConfig, clock: Arc<dyn TimeProvider>) -> TelemetryResult<Self> {
        config.validate()?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (frames, _) = watch::channel(None);

        Ok(Self {
            muscle: Arc::new(Mutex::new(MuscleSession::new(&config))),
            thermal: Arc::new(Mutex::new(ThermalSession::new(&config))),
            config,
            clock,
            chain: None,
            event_loop: None,
            running: Arc::new(AtomicBool::new(false)),
            changes,
            frames: Arc::new(frames),
            sensor_host: None,
        })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn frames(&self) -> watch::Receiver<Option<DisplayFrame>> {
        self.frames.subscribe()
    }

    /// Shared handle for operator controls (markers, calibration)
    pub fn muscle(&self) -> Arc<Mutex<MuscleSession>> {
        Arc::clone(&self.muscle)
    }

    pub fn thermal(&self) -> Arc<Mutex<ThermalSession>> {
        Arc::clone(&self.thermal)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn sensor_host(&self) -> Option<&str> {
        self.sensor_host.as_deref()
    }

    pub fn status(&self) -> MonitorStatus {
        let muscle = self.muscle.lock();
        let thermal = self.thermal.lock();
        MonitorStatus {
            running: self.is_running(),
            sensor_host: self.sensor_host.clone(),
            muscle: muscle.state(),
            thermal: thermal.state(),
            muscle_samples: muscle.samples().len(),
            thermal_sensor: thermal.sensor_model().map(str::to_string),
            parse_errors: muscle.parse_errors() + thermal.parse_errors(),
        }
    }

    /// Sensor host for network mode: discovered when enabled, else configured
    pub async fn resolve_sensor_host(&self) -> String {
        let primary = self.config.discovery.primary_host.clone();
        if self.config.connection.mode != ConnectionMode::Network || !self.config.discovery.enabled {
            return primary;
        }
        DeviceDiscovery::from_config(&self.config)
            .configured_or_discovered(&primary)
            .await
    }

    /// Start both streams over HTTP
    pub async fn start(&mut self) -> TelemetryResult<()> {
        let host = self.resolve_sensor_host().await;
        info!(mode = %self.config.connection.mode, host = %host, "Starting telemetry monitor");

        let muscle = self.transports(SensorKind::Muscle, &host)?;
        let thermal = self.transports(SensorKind::Thermal, &host)?;
        self.sensor_host = Some(host);
        self.start_with(muscle, thermal);
        Ok(())
    }

    /// Start both streams against simulated sensors
    pub fn start_simulated(&mut self) {
        let muscle = StreamTransports {
            push: None,
            pull: Arc::new(SimulatedMuscleSource::new(Arc::clone(&self.clock))),
        };
        let thermal = StreamTransports {
            push: None,
            pull: Arc::new(SimulatedThermalSource::new(
                Arc::clone(&self.clock),
                self.config.thermal.grid_width,
                self.config.thermal.grid_height,
            )),
        };
        info!("Starting telemetry monitor with simulated sensors");
        self.sensor_host = None;
        self.start_with(muscle, thermal);
    }

    /// Start both streams over the given transports, replacing any running run.
    /// Must be called from within a tokio runtime.
    pub fn start_with(&mut self, muscle: StreamTransports, thermal: StreamTransports) {
        self.stop_tasks();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut chain = FallbackChain::new(events_tx, Arc::clone(&self.clock));

        self.muscle.lock().start();
        self.thermal.lock().start();
        self.running.store(true, Ordering::Release);

        let event_loop = EventLoop {
            clock: Arc::clone(&self.clock),
            muscle: Arc::clone(&self.muscle),
            thermal: Arc::clone(&self.thermal),
            running: Arc::clone(&self.running),
            changes: self.changes.clone(),
            frames: Arc::clone(&self.frames),
            evaluation_interval: Duration::from_millis(self.config.connection.evaluation_interval_ms),
        };
        self.event_loop = Some(tokio::spawn(event_loop.run(events_rx)));

        chain.start(
            SensorKind::Muscle,
            muscle,
            ChainSettings::from_config(&self.config, SensorKind::Muscle),
        );
        chain.start(
            SensorKind::Thermal,
            thermal,
            ChainSettings::from_config(&self.config, SensorKind::Thermal),
        );
        self.chain = Some(chain);
    }

    /// Stop acquisition and the event loop. Sessions keep their data.
    pub fn shutdown(&mut self) {
        if self.stop_tasks() {
            info!("Telemetry monitor stopped");
        }
    }

    /// Stop, then discard all session data
    pub fn reset(&mut self) {
        self.shutdown();
        self.muscle.lock().reset();
        self.thermal.lock().reset();
        self.frames.send_replace(None);
    }

    fn transports(&self, stream: SensorKind, host: &str) -> TelemetryResult<StreamTransports> {
        http_transports(&self.config, stream, host).map_err(|source| {
            TelemetryError::transport(stream, source, crate::error_context!("monitor", "start"))
        })
    }

    fn stop_tasks(&mut self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.muscle.lock().stop();
        self.thermal.lock().stop();
        if let Some(mut chain) = self.chain.take() {
            chain.stop_all();
        }
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
        was_running
    }
}

impl Drop for TelemetryMonitor {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

struct EventLoop {
    clock: Arc<dyn TimeProvider>,
    muscle: Arc<Mutex<MuscleSession>>,
    thermal: Arc<Mutex<ThermalSession>>,
    running: Arc<AtomicBool>,
    changes: broadcast::Sender<StateChange>,
    frames: Arc<watch::Sender<Option<DisplayFrame>>>,
    evaluation_interval: Duration,
}

impl EventLoop {
    async fn run(self, mut events: mpsc::Receiver<StreamEvent>) {
        let mut tick = interval(self.evaluation_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = tick.tick() => self.evaluate(),
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
        }
        debug!("Event loop finished");
    }

    fn dispatch(&self, event: StreamEvent) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let now = self.clock.now_millis();

        match event {
            StreamEvent::Payload {
                stream: SensorKind::Muscle,
                body,
                received_at,
                ..
            } => {
                let mut session = self.muscle.lock();
                if let Ok(report) = session.ingest_payload(&body, received_at) {
                    if let Some(outcome) = report.calibration {
                        info!(min = outcome.range.min, max = outcome.range.max, substituted = outcome.substituted(), "Muscle calibration stored");
                    }
                }
                let change = session.evaluate(now);
                drop(session);
                self.publish(change);
            }
            StreamEvent::Payload {
                stream: SensorKind::Thermal,
                body,
                received_at,
                ..
            } => {
                let mut session = self.thermal.lock();
                if let Ok(Some(frame)) = session.ingest_payload(&body, received_at) {
                    self.frames.send_replace(Some(frame));
                }
                let change = session.evaluate(now);
                drop(session);
                self.publish(change);
            }
            other => {
                let change = match other.stream() {
                    SensorKind::Muscle => self.muscle.lock().handle_event(&other, now),
                    SensorKind::Thermal => self.thermal.lock().handle_event(&other, now),
                };
                self.publish(change);
            }
        }
    }

    fn evaluate(&self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let now = self.clock.now_millis();

        let muscle_change = {
            let mut session = self.muscle.lock();
            if let Some(outcome) = session.poll_calibration(now) {
                info!(min = outcome.range.min, max = outcome.range.max, substituted = outcome.substituted(), "Muscle calibration stored");
            }
            session.evaluate(now)
        };
        self.publish(muscle_change);

        let thermal_change = self.thermal.lock().evaluate(now);
        self.publish(thermal_change);
    }

    fn publish(&self, change: Option<StateChange>) {
        let Some(change) = change else {
            return;
        };
        if self.changes.send(change).is_err() {
            debug!(stream = %change.stream, to = %change.to, "State change had no subscribers");
        }
    }
}
