//! Live channel senders.
//!
//! A sender is the server end of one open live channel. The broker only
//! needs to push commands into it; how they reach the client is up to the
//! implementation.

use bytes::Bytes;
use ferry_protocol::{codec, CodecError, Command};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_SENDER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a live channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId(pub String);

impl SenderId {
    /// Create a sender ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique sender ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("live_{:x}", NEXT_SENDER.fetch_add(1, Ordering::Relaxed)))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Live channel errors.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The client end is gone.
    #[error("Live channel closed")]
    SenderClosed,

    /// No sender registered under this ID.
    #[error("Unknown sender: {0}")]
    UnknownSender(SenderId),

    /// Command could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Server end of a live channel.
pub trait EventSender: Send + Sync {
    /// Push a command to the client without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed.
    fn send(&self, command: &Command) -> Result<(), LiveError>;
}

/// An [`EventSender`] that encodes commands as event-stream events into an
/// unbounded queue.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSender {
    /// Create a sender and the receiving end of its queue.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Check if the receiving end was dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventSender for ChannelSender {
    fn send(&self, command: &Command) -> Result<(), LiveError> {
        let event = codec::encode(command)?;
        self.tx.send(event).map_err(|_| LiveError::SenderClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(SenderId::generate(), SenderId::generate());
        assert!(SenderId::generate().as_str().starts_with("live_"));
    }

    #[test]
    fn test_channel_sender() {
        let (sender, mut rx) = ChannelSender::channel();
        sender.send(&Command::Reload).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"data: RELOAD\r\n\r\n"));

        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(sender.send(&Command::Ping), Err(LiveError::SenderClosed)));
    }
}
