//! In-memory progress pub/sub for the loopback backend.

use futures::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use uplift_core::traits::bridge::ProgressSubscription;
use uplift_core::types::ProgressEvent;

/// Broadcast fan-out of progress events to every registered listener.
#[derive(Debug)]
pub struct ProgressPubSub {
    /// Sender side of the broadcast channel.
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressPubSub {
    /// Create a pub/sub with room for `buffer_size` undelivered events.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Publish an event; returns how many listeners received it.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Register a new listener.
    ///
    /// A listener that falls behind skips the overwritten events and keeps
    /// reading; the stream ends when the pub/sub is dropped.
    pub fn subscribe(&self) -> ProgressSubscription {
        let rx = self.tx.subscribe();
        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Progress listener lagged behind");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        ProgressSubscription::new(Box::pin(stream))
    }
}
