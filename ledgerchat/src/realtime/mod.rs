//! Realtime change subscriptions.
//!
//! Defines the [`RealtimeChannel`] trait the chat core consumes. The
//! backend's channel pushes every inserted `messages` row to matching
//! subscribers. Delivery is at-least-once: consumers must tolerate
//! duplicates, including full replays after a resubscribe.
//!
//! - [`hub::RealtimeHub`] is the in-process implementation used by tests,
//!   the in-memory backend and the demo.

pub mod hub;

use std::fmt;

use tokio::sync::mpsc;

use ledgerchat_proto::message::{MessageRow, ThreadId};

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inserts into one thread.
    Thread(ThreadId),
    /// Every message insert (used to refresh thread previews).
    AllMessages,
}

impl Topic {
    /// Whether a row inserted into `thread` belongs to this topic.
    #[must_use]
    pub fn matches(&self, thread: &ThreadId) -> bool {
        match self {
            Self::Thread(id) => id == thread,
            Self::AllMessages => true,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "chat:{id}"),
            Self::AllMessages => write!(f, "public:messages"),
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: mpsc::Receiver<MessageRow>,
}

impl Subscription {
    pub(crate) const fn new(topic: Topic, rx: mpsc::Receiver<MessageRow>) -> Self {
        Self { topic, rx }
    }

    /// The topic this subscription listens to.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Waits for the next inserted row.
    ///
    /// Returns `None` once the channel has shut down.
    pub async fn next(&mut self) -> Option<MessageRow> {
        self.rx.recv().await
    }

    /// Returns an already-delivered row without waiting, if any.
    pub fn try_next(&mut self) -> Option<MessageRow> {
        self.rx.try_recv().ok()
    }

    /// Stops delivery. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {
        tracing::debug!(topic = %self.topic, "unsubscribed");
    }
}

/// Source of realtime insert notifications.
pub trait RealtimeChannel: Send + Sync {
    /// Opens a subscription for `topic`.
    fn subscribe(&self, topic: Topic) -> Subscription;
}
