//! Transfer driver: the loop that moves the loopback queue forward.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::pubsub::ProgressPubSub;
use crate::queue::BackendQueue;

/// Advances pending items on a fixed tick and publishes their progress.
#[derive(Debug)]
pub struct TransferDriver {
    /// Queue being processed.
    queue: Arc<Mutex<BackendQueue>>,
    /// Where progress events go.
    pubsub: Arc<ProgressPubSub>,
    /// Time between two advances.
    tick: Duration,
}

impl TransferDriver {
    /// Create a new driver.
    pub fn new(queue: Arc<Mutex<BackendQueue>>, pubsub: Arc<ProgressPubSub>, tick: Duration) -> Self {
        Self {
            queue,
            pubsub,
            tick,
        }
    }

    /// Run until the queue drains, processing is stopped, or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(tick_ms = self.tick.as_millis() as u64, "Transfer driver started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Transfer driver cancelled");
                    break;
                }
                _ = time::sleep(self.tick) => {}
            }

            let (events, drained) = {
                let mut queue = self.queue.lock().await;
                if !queue.is_processing {
                    tracing::info!("Processing stopped, transfer driver exiting");
                    break;
                }
                let events = queue.advance(self.tick.as_secs_f64());
                let drained = queue.is_drained();
                if drained {
                    queue.is_processing = false;
                }
                (events, drained)
            };

            for event in events {
                let listeners = self.pubsub.publish(event);
                tracing::trace!(listeners, "Progress event published");
            }

            if drained {
                tracing::info!("All uploads reached a final state");
                break;
            }
        }
    }
}
