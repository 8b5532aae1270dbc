// tests/common/mod.rs
//! Scripted transports shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use biosignal_core::error::TransportError;
use biosignal_core::transport::{ChainSettings, PullSource, PushChannel, PushConnector, StreamEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const ENDPOINT: &str = "mock://sensor";

/// Defaults matching the production configuration, with a fast pull interval
pub fn settings() -> ChainSettings {
    ChainSettings {
        push_open_timeout: Duration::from_secs(5),
        push_idle_timeout: Duration::from_secs(10),
        reconnect_backoff: Duration::from_secs(3),
        max_reconnect_attempts: 3,
        poll_interval: Duration::from_millis(100),
        failure_threshold: 15,
        failure_cooldown_ms: 30_000,
    }
}

/// Next event, failing the test if none arrives within a minute of (virtual) time
pub async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("no event within 60 s")
        .expect("event channel closed")
}

/// How a scripted push channel behaves once open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScript {
    /// Breaks on the first read
    Break,
    /// Closes cleanly on the first read
    CloseCleanly,
    /// Delivers one message, then breaks
    OneMessageThenBreak,
    /// Never delivers anything
    Silent,
}

/// How a scripted connector answers `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenScript {
    Refuse,
    Hang,
    Accept(ChannelScript),
}

pub struct ScriptedConnector {
    script: OpenScript,
    opens: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: OpenScript) -> Self {
        Self {
            script,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushConnector for ScriptedConnector {
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.script {
            OpenScript::Refuse => Err(TransportError::Refused {
                endpoint: ENDPOINT.to_string(),
                reason: "connection refused".to_string(),
            }),
            OpenScript::Hang => std::future::pending().await,
            OpenScript::Accept(script) => Ok(Box::new(ScriptedChannel { script, delivered: false })),
        }
    }

    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }
}

struct ScriptedChannel {
    script: ChannelScript,
    delivered: bool,
}

#[async_trait]
impl PushChannel for ScriptedChannel {
    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        let broken = TransportError::Closed {
            endpoint: ENDPOINT.to_string(),
            clean: false,
        };
        match self.script {
            ChannelScript::Break => Err(broken),
            ChannelScript::CloseCleanly => Ok(None),
            ChannelScript::OneMessageThenBreak if !self.delivered => {
                self.delivered = true;
                Ok(Some(r#"{"timestamp": 1, "muscleActivity": 500}"#.to_string()))
            }
            ChannelScript::OneMessageThenBreak => Err(broken),
            ChannelScript::Silent => std::future::pending().await,
        }
    }
}

/// Pull source that answers after `delay`, tracking how many pulls overlap
pub struct ScriptedPull {
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedPull {
    pub fn ok(delay: Duration) -> Self {
        Self::new(delay, false)
    }

    pub fn failing() -> Self {
        Self::new(Duration::ZERO, true)
    }

    fn new(delay: Duration, fail: bool) -> Self {
        Self {
            delay,
            fail,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PullSource for ScriptedPull {
    async fn pull(&self) -> Result<String, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            Err(TransportError::Status {
                endpoint: ENDPOINT.to_string(),
                status: 503,
            })
        } else {
            Ok(format!(r#"{{"timestamp": {call}, "muscleActivity": 500}}"#))
        }
    }

    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }
}
