// src/transport/websocket.rs
//! WebSocket push channel to the sensor host

use crate::error::TransportError;
use crate::transport::traits::{PushChannel, PushConnector};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn classify(endpoint: &str, err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportError::Refused {
                endpoint: endpoint.to_string(),
                reason: io.to_string(),
            }
        }
        tungstenite::Error::Http(response) => TransportError::Status {
            endpoint: endpoint.to_string(),
            status: response.status().as_u16(),
        },
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed {
                endpoint: endpoint.to_string(),
                clean: true,
            }
        }
        other => TransportError::Request {
            endpoint: endpoint.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Opens `ws://host:port` and yields each text message
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        let (socket, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| classify(&self.url, e))?;

        debug!(endpoint = %self.url, status = response.status().as_u16(), "WebSocket opened");
        Ok(Box::new(WebSocketChannel {
            endpoint: self.url.clone(),
            socket: Some(socket),
        }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketChannel {
    endpoint: String,
    socket: Option<Socket>,
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn next_message(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(socket) = self.socket.as_mut() else {
                return Ok(None);
            };

            match socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => trace!(endpoint = %self.endpoint, "Skipping non-UTF-8 binary message"),
                },
                // Close handshake completed by the peer
                Some(Ok(Message::Close(frame))) => {
                    debug!(endpoint = %self.endpoint, ?frame, "WebSocket closed by peer");
                    self.socket = None;
                    return Ok(None);
                }
                // Ping/pong are answered by tungstenite on the next read
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.socket = None;
                    debug!(endpoint = %self.endpoint, error = %e, "WebSocket broke");
                    return Err(TransportError::Closed {
                        endpoint: self.endpoint.clone(),
                        clean: false,
                    });
                }
                None => {
                    self.socket = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                trace!(endpoint = %self.endpoint, error = %e, "WebSocket close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_handshake_status() {
        let response = tungstenite::http::Response::builder()
            .status(404)
            .body(None)
            .unwrap();
        let err = classify("ws://pi:8091", tungstenite::Error::Http(response));
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
    }

    #[test]
    fn test_classify_refused() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        let err = classify("ws://pi:8091", tungstenite::Error::Io(io));
        assert!(matches!(err, TransportError::Refused { .. }));
    }
}
