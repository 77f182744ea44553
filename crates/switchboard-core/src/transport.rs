//! Transport capability stored in the registry.
//!
//! The registry never sees sockets. It holds an `Arc<dyn Transport>` per
//! connection and calls [`Transport::send`] outside its lock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::errors::SendError;

/// One serialized UTF-8 text frame, shared across all recipients of a fan-out.
pub type Frame = Arc<str>;

/// Something a frame can be sent to.
///
/// Implementations own their own send timeout; a timeout is reported as
/// [`SendError::Timeout`] and treated like any other failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one frame.
    async fn send(&self, frame: Frame) -> Result<(), SendError>;
}

/// Transport backed by a bounded channel drained by a socket writer task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
    send_timeout: Duration,
}

impl ChannelTransport {
    /// Wrap a channel sender. `send_timeout` bounds the wait for queue capacity.
    pub fn new(tx: mpsc::Sender<Frame>, send_timeout: Duration) -> Self {
        Self { tx, send_timeout }
    }

    /// Create a transport and the receiver its writer task should drain.
    pub fn channel(capacity: usize, send_timeout: Duration) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, send_timeout), rx)
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Frame) -> Result<(), SendError> {
        match self.tx.send_timeout(frame, self.send_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::Closed),
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::Timeout(self.send_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Arc::from(s)
    }

    #[tokio::test]
    async fn send_success() {
        let (transport, mut rx) = ChannelTransport::channel(8, Duration::from_secs(1));
        transport.send(frame("hello")).await.unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_fails() {
        let (transport, rx) = ChannelTransport::channel(8, Duration::from_secs(1));
        drop(rx);
        assert!(transport.is_closed());
        let err = transport.send(frame("hello")).await.unwrap_err();
        assert_eq!(err, SendError::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_full_channel_times_out() {
        let (transport, _rx) = ChannelTransport::channel(1, Duration::from_millis(100));
        transport.send(frame("first")).await.unwrap();
        let err = transport.send(frame("second")).await.unwrap_err();
        assert_eq!(err, SendError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (transport, mut rx) = ChannelTransport::channel(8, Duration::from_secs(1));
        for i in 0..5 {
            transport.send(frame(&format!("msg_{i}"))).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), format!("msg_{i}"));
        }
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let (transport, mut rx) = ChannelTransport::channel(0, Duration::from_secs(1));
        transport.send(frame("x")).await.unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "x");
    }
}
