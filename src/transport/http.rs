// src/transport/http.rs
//! HTTP pull source and server-sent event push channel

use crate::config::constants::transport::{EVENT_DATA_PREFIX, MAX_EVENT_BYTES};
use crate::error::TransportError;
use crate::transport::traits::{PullSource, PushChannel, PushConnector};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{header, Client};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

fn build_client(timeout: Option<Duration>) -> Result<Client, TransportError> {
    let mut builder = Client::builder().user_agent(concat!("biosignal-core/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| TransportError::Request {
        endpoint: "client".to_string(),
        reason: e.to_string(),
    })
}

/// Map a reqwest failure onto the transport taxonomy
pub(crate) fn classify(endpoint: &str, operation: &'static str, timeout: Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            endpoint: endpoint.to_string(),
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() {
        TransportError::Refused {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else if let Some(status) = err.status() {
        TransportError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        }
    } else {
        TransportError::Request {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Single bounded GET per pull
pub struct HttpPullSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpPullSource {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self, TransportError> {
        let timeout = Duration::from_millis(timeout_ms);
        Ok(Self {
            client: build_client(Some(timeout))?,
            url: url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl PullSource for HttpPullSource {
    async fn pull(&self) -> Result<String, TransportError> {
        let request = self
            .client
            .get(&self.url)
            .header(header::CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| TransportError::Timeout {
                endpoint: self.url.clone(),
                operation: "pull",
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| classify(&self.url, "pull", self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: self.url.clone(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| classify(&self.url, "pull", self.timeout, e))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Opens a `text/event-stream` response and yields each event's data
pub struct EventStreamConnector {
    client: Client,
    url: String,
}

impl EventStreamConnector {
    /// The stream itself is long-lived, so the client carries no overall timeout;
    /// the chain bounds the open and the idle gaps.
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(None)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushConnector for EventStreamConnector {
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| classify(&self.url, "push open", Duration::ZERO, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: self.url.clone(),
                status: status.as_u16(),
            });
        }

        debug!(endpoint = %self.url, "Event stream opened");
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(Box::new(EventStreamChannel {
            endpoint: self.url.clone(),
            chunks: Some(chunks),
            decoder: EventDecoder::default(),
        }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct EventStreamChannel {
    endpoint: String,
    chunks: Option<BoxStream<'static, Result<Vec<u8>, reqwest::Error>>>,
    decoder: EventDecoder,
}

#[async_trait]
impl PushChannel for EventStreamChannel {
    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Ok(Some(event));
            }

            let Some(chunks) = self.chunks.as_mut() else {
                return Ok(None);
            };

            match chunks.next().await {
                Some(Ok(bytes)) => {
                    trace!(endpoint = %self.endpoint, bytes = bytes.len(), "Event stream chunk");
                    self.decoder
                        .push(&bytes)
                        .map_err(|reason| TransportError::Request {
                            endpoint: self.endpoint.clone(),
                            reason,
                        })?;
                }
                Some(Err(e)) => {
                    self.chunks = None;
                    debug!(endpoint = %self.endpoint, error = %e, "Event stream broke");
                    return Err(TransportError::Closed {
                        endpoint: self.endpoint.clone(),
                        clean: false,
                    });
                }
                None => {
                    self.chunks = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.chunks = None;
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Events are separated by a blank line; only `data:` fields are kept and
/// multiple data lines are joined with `\n`. Comment lines (keep-alives) and
/// other fields are ignored.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    ready: VecDeque<String>,
}

impl EventDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        while let Some(pos) = find_blank_line(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&raw[..pos]);
            if let Some(data) = event_data(&text) {
                self.ready.push_back(data);
            }
        }

        if self.buffer.len() > MAX_EVENT_BYTES {
            self.buffer.clear();
            return Err(format!("event exceeds {} bytes", MAX_EVENT_BYTES));
        }
        Ok(())
    }

    pub fn next_event(&mut self) -> Option<String> {
        self.ready.pop_front()
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix(EVENT_DATA_PREFIX))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Push connector for environments where the preferred transport cannot run
pub struct UnsupportedPush {
    reason: String,
}

impl UnsupportedPush {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl PushConnector for UnsupportedPush {
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        Err(TransportError::Unsupported(self.reason.clone()))
    }

    fn endpoint(&self) -> String {
        "unsupported".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_splits_events_across_chunks() {
        let mut decoder = EventDecoder::default();
        decoder.push(b"data: {\"type\":\"initial\"").unwrap();
        assert!(decoder.next_event().is_none());

        decoder.push(b"}\n\ndata: {\"type\":\"heartbeat\"}\n\n").unwrap();
        assert_eq!(decoder.next_event().as_deref(), Some("{\"type\":\"initial\"}"));
        assert_eq!(decoder.next_event().as_deref(), Some("{\"type\":\"heartbeat\"}"));
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_decoder_ignores_comments_and_crlf() {
        let mut decoder = EventDecoder::default();
        decoder.push(b": keep-alive\r\n\r\nevent: update\r\ndata:a\r\ndata: b\r\n\r\n").unwrap();

        assert_eq!(decoder.next_event().as_deref(), Some("a\nb"));
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_decoder_rejects_oversized_event() {
        let mut decoder = EventDecoder::default();
        let huge = vec![b'x'; MAX_EVENT_BYTES + 1];
        assert!(decoder.push(&huge).is_err());

        decoder.push(b"data: ok\n\n").unwrap();
        assert_eq!(decoder.next_event().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_unsupported_push() {
        let connector = UnsupportedPush::new("direct link");
        let err = connector.open().await.err().unwrap();
        assert!(matches!(err, TransportError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_pull_refused_on_closed_port() {
        // Port 9 (discard) on localhost is essentially never listening
        let source = HttpPullSource::new("http://127.0.0.1:9/thermal-data", 1_000).unwrap();
        let err = source.pull().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Refused { .. } | TransportError::Request { .. } | TransportError::Timeout { .. }
        ));
    }
}
