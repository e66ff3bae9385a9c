//! In-process realtime channel.
//!
//! Each subscription owns a bounded [`tokio::sync::mpsc`] receiver. Publishing
//! fans a row out to every live subscription whose topic matches; closed
//! subscriptions are pruned on the way.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use ledgerchat_proto::message::MessageRow;
use ledgerchat_proto::realtime::{self, CodecError};

use super::{RealtimeChannel, Subscription, Topic};

/// Default per-subscription buffer.
const DEFAULT_BUFFER: usize = 256;

struct Subscriber {
    topic: Topic,
    tx: mpsc::Sender<MessageRow>,
}

/// Cloneable handle to an in-process realtime channel.
#[derive(Clone)]
pub struct RealtimeHub {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    buffer: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    /// Creates a hub with the default per-subscription buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Creates a hub with a custom per-subscription buffer.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            buffer: buffer.max(1),
        }
    }

    /// Delivers `row` to every matching subscription.
    ///
    /// Returns the number of subscriptions the row was handed to. A
    /// subscription whose buffer is full misses the row (logged).
    pub fn publish(&self, row: &MessageRow) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for sub in subscribers.iter().filter(|s| s.topic.matches(&row.thread_id)) {
            match sub.tx.try_send(row.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        topic = %sub.topic,
                        message_id = %row.id,
                        error = %e,
                        "realtime subscriber lagging, row dropped"
                    );
                }
            }
        }
        drop(subscribers);
        delivered
    }

    /// Decodes a raw change payload and publishes the inserted row.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the payload is not a message insert.
    pub fn publish_raw(&self, payload: &[u8]) -> Result<usize, CodecError> {
        let row = realtime::decode_message_insert(payload)?;
        Ok(self.publish(&row))
    }

    /// Number of subscriptions that are still open.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

impl RealtimeChannel for RealtimeHub {
    fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.lock().push(Subscriber { topic, tx });
        tracing::debug!(%topic, "subscribed");
        Subscription::new(topic, rx)
    }
}
