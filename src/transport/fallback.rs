// src/transport/fallback.rs
//! Per-stream acquisition loops with push-to-pull fallback
//!
//! Each started stream gets exactly one task. The task first tries the push
//! connector; an open failure, open timeout or unsupported environment drops
//! straight to interval pulling. An established push channel that breaks is
//! reopened after a fixed backoff a bounded number of times, then the stream
//! pulls for the rest of the run. A clean close falls back immediately.
//!
//! Every failure feeds the stream's [`FailureGovernor`]; when it trips the loop
//! reports [`StreamEvent::FailureLimit`], sleeps out the cooldown and resumes.

use crate::config::TelemetryConfig;
use crate::connection::{FailureGovernor, FailureOutcome};
use crate::error::TransportError;
use crate::transport::traits::{PullSource, PushConnector};
use crate::transport::types::StreamEvent;
use crate::types::{SensorKind, TransportMode};
use crate::utils::time::TimeProvider;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Timing and bounds for one stream's acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSettings {
    pub push_open_timeout: Duration,
    pub push_idle_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub max_reconnect_attempts: u32,
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    pub failure_cooldown_ms: u64,
}

impl ChainSettings {
    pub fn from_config(config: &TelemetryConfig, stream: SensorKind) -> Self {
        let t = &config.transport;
        Self {
            push_open_timeout: Duration::from_millis(t.push_open_timeout_ms),
            push_idle_timeout: Duration::from_millis(t.push_idle_timeout_ms),
            reconnect_backoff: Duration::from_millis(t.reconnect_backoff_ms),
            max_reconnect_attempts: t.max_reconnect_attempts,
            poll_interval: t.poll_interval(stream),
            failure_threshold: config.connection.failure_threshold,
            failure_cooldown_ms: config.connection.failure_cooldown_ms,
        }
    }
}

/// The transports available to one stream
#[derive(Clone)]
pub struct StreamTransports {
    /// `None` skips straight to pulling
    pub push: Option<Arc<dyn PushConnector>>,
    pub pull: Arc<dyn PullSource>,
}

/// Busy flag shared between a pull loop and its in-flight request
#[derive(Debug, Clone, Default)]
pub struct PullGuard {
    busy: Arc<AtomicBool>,
}

/// Held while a pull is in flight; releases the guard on drop
#[derive(Debug)]
pub struct PullPermit {
    busy: Arc<AtomicBool>,
}

impl PullGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a pull is already in flight
    pub fn try_acquire(&self) -> Option<PullPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PullPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for PullPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

struct StreamTask {
    handle: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

/// Owns at most one acquisition task per stream
pub struct FallbackChain {
    events: mpsc::Sender<StreamEvent>,
    clock: Arc<dyn TimeProvider>,
    tasks: HashMap<SensorKind, StreamTask>,
}

impl FallbackChain {
    pub fn new(events: mpsc::Sender<StreamEvent>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            events,
            clock,
            tasks: HashMap::new(),
        }
    }

    /// Start acquiring `stream`, replacing any loop already running for it.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, stream: SensorKind, transports: StreamTransports, settings: ChainSettings) {
        self.stop(stream);

        let active = Arc::new(AtomicBool::new(true));
        let worker = StreamWorker {
            stream,
            transports,
            settings,
            events: self.events.clone(),
            clock: Arc::clone(&self.clock),
            active: Arc::clone(&active),
            governor: FailureGovernor::new(settings.failure_threshold, settings.failure_cooldown_ms),
        };

        info!(%stream, "Starting acquisition");
        let handle = tokio::spawn(worker.run());
        self.tasks.insert(stream, StreamTask { handle, active });
    }

    /// Stop `stream`; no event for it is emitted after this returns
    pub fn stop(&mut self, stream: SensorKind) -> bool {
        match self.tasks.remove(&stream) {
            Some(task) => {
                task.active.store(false, Ordering::Release);
                task.handle.abort();
                debug!(%stream, "Acquisition stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        let streams: Vec<SensorKind> = self.tasks.keys().copied().collect();
        for stream in streams {
            self.stop(stream);
        }
    }

    /// Whether a loop for `stream` is registered and has not finished
    pub fn is_running(&self, stream: SensorKind) -> bool {
        self.tasks
            .get(&stream)
            .map_or(false, |task| !task.handle.is_finished())
    }

    pub fn running_streams(&self) -> Vec<SensorKind> {
        let mut streams: Vec<SensorKind> = self
            .tasks
            .iter()
            .filter(|(_, task)| !task.handle.is_finished())
            .map(|(stream, _)| *stream)
            .collect();
        streams.sort();
        streams
    }
}

impl Drop for FallbackChain {
    fn drop(&mut self) {
        self.stop_all();
    }
}

enum PushOutcome {
    FallBack,
    Stopped,
}

enum ChannelEnd {
    Clean,
    Unclean(TransportError),
    Stopped,
}

struct StreamWorker {
    stream: SensorKind,
    transports: StreamTransports,
    settings: ChainSettings,
    events: mpsc::Sender<StreamEvent>,
    clock: Arc<dyn TimeProvider>,
    active: Arc<AtomicBool>,
    governor: FailureGovernor,
}

impl StreamWorker {
    async fn run(mut self) {
        if let Some(connector) = self.transports.push.clone() {
            match self.run_push(connector.as_ref()).await {
                PushOutcome::Stopped => return,
                PushOutcome::FallBack => {
                    info!(stream = %self.stream, "Falling back to pull transport");
                }
            }
        }
        self.run_pull().await;
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Send an event unless stopped; false once the loop should exit
    async fn emit(&self, event: StreamEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        self.events.send(event).await.is_ok()
    }

    async fn emit_payload(&mut self, mode: TransportMode, body: String) -> bool {
        self.governor.record_success();
        let event = StreamEvent::Payload {
            stream: self.stream,
            mode,
            body,
            received_at: self.clock.now_millis(),
        };
        self.emit(event).await
    }

    /// Count a failure and, if the governor trips, wait out the cooldown.
    /// Returns false once the loop should exit.
    async fn report_failure(&mut self, mode: TransportMode, error: TransportError) -> bool {
        let outcome = self.governor.record_failure();
        let consecutive = match outcome {
            FailureOutcome::Counted(n) | FailureOutcome::Tripped(n) => n,
        };
        debug!(stream = %self.stream, %mode, consecutive, error = %error, "Transport failure");

        if !self
            .emit(StreamEvent::TransportFailed {
                stream: self.stream,
                mode,
                error,
                consecutive,
            })
            .await
        {
            return false;
        }

        if let FailureOutcome::Tripped(failures) = outcome {
            let cooldown = self.governor.cooldown();
            warn!(
                stream = %self.stream,
                failures,
                cooldown_ms = cooldown.as_millis() as u64,
                "Consecutive failure limit reached; pausing"
            );
            if !self
                .emit(StreamEvent::FailureLimit {
                    stream: self.stream,
                    failures,
                    cooldown_ms: cooldown.as_millis() as u64,
                })
                .await
            {
                return false;
            }

            sleep(cooldown).await;
            self.governor.reset();
            info!(stream = %self.stream, "Failure cooldown elapsed; resuming");
            return self.emit(StreamEvent::CooldownElapsed { stream: self.stream }).await;
        }
        true
    }

    async fn run_push(&mut self, connector: &dyn PushConnector) -> PushOutcome {
        let endpoint = connector.endpoint();
        let mut reconnects_used: u32 = 0;

        loop {
            if !self
                .emit(StreamEvent::ModeChanged {
                    stream: self.stream,
                    mode: TransportMode::Push,
                })
                .await
            {
                return PushOutcome::Stopped;
            }

            let opened = match timeout(self.settings.push_open_timeout, connector.open()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    endpoint: endpoint.clone(),
                    operation: "push open",
                    timeout_ms: self.settings.push_open_timeout.as_millis() as u64,
                }),
            };

            let mut channel = match opened {
                Ok(channel) => channel,
                Err(error) => {
                    let unsupported = matches!(error, TransportError::Unsupported(_));
                    if unsupported {
                        info!(stream = %self.stream, reason = %error, "Push transport unavailable");
                    }
                    if !self.report_failure(TransportMode::Push, error).await {
                        return PushOutcome::Stopped;
                    }
                    // A failed first open never retries; a failed reopen uses up an attempt
                    if reconnects_used == 0 || unsupported || reconnects_used >= self.settings.max_reconnect_attempts {
                        return PushOutcome::FallBack;
                    }
                    reconnects_used += 1;
                    sleep(self.settings.reconnect_backoff).await;
                    continue;
                }
            };

            info!(stream = %self.stream, %endpoint, "Push channel open");
            let end = loop {
                if !self.is_active() {
                    break ChannelEnd::Stopped;
                }
                match timeout(self.settings.push_idle_timeout, channel.next_message()).await {
                    Err(_) => {
                        break ChannelEnd::Unclean(TransportError::Timeout {
                            endpoint: endpoint.clone(),
                            operation: "push idle",
                            timeout_ms: self.settings.push_idle_timeout.as_millis() as u64,
                        })
                    }
                    Ok(Ok(Some(body))) => {
                        reconnects_used = 0;
                        if !self.emit_payload(TransportMode::Push, body).await {
                            break ChannelEnd::Stopped;
                        }
                    }
                    Ok(Ok(None)) => break ChannelEnd::Clean,
                    Ok(Err(error)) => break ChannelEnd::Unclean(error),
                }
            };
            channel.close().await;

            match end {
                ChannelEnd::Stopped => return PushOutcome::Stopped,
                ChannelEnd::Clean => {
                    info!(stream = %self.stream, "Push channel closed cleanly");
                    return PushOutcome::FallBack;
                }
                ChannelEnd::Unclean(error) => {
                    warn!(stream = %self.stream, error = %error, "Push channel lost");
                    if !self.report_failure(TransportMode::Push, error).await {
                        return PushOutcome::Stopped;
                    }
                    if reconnects_used >= self.settings.max_reconnect_attempts {
                        return PushOutcome::FallBack;
                    }
                    reconnects_used += 1;
                    debug!(
                        stream = %self.stream,
                        attempt = reconnects_used,
                        backoff_ms = self.settings.reconnect_backoff.as_millis() as u64,
                        "Reconnecting push channel"
                    );
                    sleep(self.settings.reconnect_backoff).await;
                }
            }
        }
    }

    async fn run_pull(&mut self) {
        if !self
            .emit(StreamEvent::ModeChanged {
                stream: self.stream,
                mode: TransportMode::Pull,
            })
            .await
        {
            return;
        }

        let guard = PullGuard::new();
        let mut in_flight = JoinSet::new();
        let (done_tx, mut done_rx) = mpsc::channel::<Result<String, TransportError>>(4);
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.is_active() {
                        return;
                    }
                    match guard.try_acquire() {
                        Some(permit) => {
                            let source = Arc::clone(&self.transports.pull);
                            let tx = done_tx.clone();
                            in_flight.spawn(async move {
                                let _permit = permit;
                                let result = source.pull().await;
                                let _ = tx.send(result).await;
                            });
                        }
                        None => trace!(stream = %self.stream, "Pull still in flight; skipping tick"),
                    }
                }
                Some(result) = done_rx.recv() => {
                    let keep_going = match result {
                        Ok(body) => self.emit_payload(TransportMode::Pull, body).await,
                        Err(error) => {
                            let limit_hit = self.governor.consecutive_failures() + 1 >= self.governor.threshold();
                            let keep_going = self.report_failure(TransportMode::Pull, error).await;
                            if limit_hit {
                                while done_rx.try_recv().is_ok() {}
                                ticker.reset();
                            }
                            keep_going
                        }
                    };
                    if !keep_going {
                        return;
                    }
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_guard_is_exclusive() {
        let guard = PullGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_settings_follow_config() {
        let config = TelemetryConfig::default();
        let muscle = ChainSettings::from_config(&config, SensorKind::Muscle);
        let thermal = ChainSettings::from_config(&config, SensorKind::Thermal);

        assert_eq!(muscle.poll_interval, Duration::from_secs(1));
        assert_eq!(thermal.poll_interval, Duration::from_millis(100));
        assert_eq!(muscle.max_reconnect_attempts, 3);
        assert_eq!(thermal.push_open_timeout, Duration::from_secs(5));
    }
}
