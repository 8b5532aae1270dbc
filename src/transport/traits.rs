// src/transport/traits.rs
//! Transport seams used by the fallback chain

use crate::error::TransportError;
use async_trait::async_trait;

/// Preferred transport: opens a persistent channel that delivers messages
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Open a channel; the caller bounds this with the open timeout
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// An established push channel
#[async_trait]
pub trait PushChannel: Send {
    /// Next message body. `Ok(None)` means the remote closed cleanly;
    /// an error means the channel broke (unclean close).
    async fn next_message(&mut self) -> Result<Option<String>, TransportError>;

    /// Release the channel; called before the chain drops it
    async fn close(&mut self) {}
}

/// Fallback transport: one bounded request per call
#[async_trait]
pub trait PullSource: Send + Sync {
    async fn pull(&self) -> Result<String, TransportError>;

    fn endpoint(&self) -> String;
}
