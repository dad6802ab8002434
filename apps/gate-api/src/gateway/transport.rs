//! Push side of a delivery channel.
//!
//! The router never writes to a socket. It pushes into a `ChannelSink`, and
//! the connection task that owns the socket drains the other end.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::events::GuestArrival;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The receiving side is gone or the channel is no longer live.
    Closed,
    /// The push did not complete within the push timeout.
    Timeout,
    /// The transport refused the event.
    Write,
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed => f.write_str("channel closed"),
            PushError::Timeout => f.write_str("push timed out"),
            PushError::Write => f.write_str("transport write failed"),
        }
    }
}

impl std::error::Error for PushError {}

#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn push(&self, event: Arc<GuestArrival>, timeout: Duration) -> Result<(), PushError>;
}

/// Bounded in-process queue between the router and a connection task.
pub struct QueueSink {
    tx: mpsc::Sender<Arc<GuestArrival>>,
}

impl QueueSink {
    /// Create a sink and the receiver its connection task drains.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Arc<GuestArrival>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChannelSink for QueueSink {
    async fn push(&self, event: Arc<GuestArrival>, timeout: Duration) -> Result<(), PushError> {
        self.tx
            .send_timeout(event, timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => PushError::Timeout,
                SendTimeoutError::Closed(_) => PushError::Closed,
            })
    }
}
