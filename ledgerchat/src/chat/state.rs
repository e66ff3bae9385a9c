//! The message list behind one open conversation.
//!
//! [`MessageList`] is plain synchronous state: every method is a single
//! mutation, so a caller holding the list's lock applies it atomically.
//! It keeps three invariants:
//!
//! 1. entries are sorted non-decreasing by `created_at`, ties by arrival;
//! 2. a pending entry and its confirmed counterpart never coexist;
//! 3. no two entries share a confirmed [`MessageId`];
//! 4. a confirmed entry is never dropped once listed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ledgerchat_proto::message::{MessageId, MessageRow, PublicId, Timestamp};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Client-side id of an entry that has not been confirmed by the store.
///
/// Displays as `temp-N`, which can never be mistaken for a store id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(u64);

impl LocalId {
    /// Allocates a process-unique local id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "temp-{}", self.0)
    }
}

/// Identity of a list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    /// Optimistic entry awaiting the store.
    Pending(LocalId),
    /// Row the store has accepted.
    Confirmed(MessageId),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(id) => write!(f, "{id}"),
            Self::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

/// Message content as held by the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Readable text.
    Plain(String),
    /// A ciphertext envelope, opened at display time.
    Sealed(String),
}

/// Delivery progress of an entry. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeliveryState {
    /// Submitted locally, store has not answered.
    Pending,
    /// Accepted by the store.
    Sent,
    /// Present in the store and visible to the recipient.
    Delivered,
    /// Seen by the recipient.
    Read,
}

impl DeliveryState {
    /// Moves to `next` if it is further along. Returns whether it moved.
    pub fn advance_to(&mut self, next: Self) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        };
        f.write_str(label)
    }
}

/// One message in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub id: EntryId,
    pub sender: PublicId,
    pub body: Body,
    pub created_at: Timestamp,
    /// Whether the stored content is (or will be) an envelope.
    pub is_encrypted: bool,
    pub state: DeliveryState,
}

impl MessageEntry {
    fn confirmed(row: MessageRow, state: DeliveryState) -> Self {
        let body = if row.is_encrypted {
            Body::Sealed(row.content)
        } else {
            Body::Plain(row.content)
        };
        Self {
            id: EntryId::Confirmed(row.id),
            sender: row.sender_id,
            body,
            created_at: row.created_at,
            is_encrypted: row.is_encrypted,
            state,
        }
    }

    /// The confirmed id, if the store has accepted this entry.
    #[must_use]
    pub const fn message_id(&self) -> Option<MessageId> {
        match self.id {
            EntryId::Confirmed(id) => Some(id),
            EntryId::Pending(_) => None,
        }
    }
}

/// Result of [`MessageList::merge_remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Duplicate,
}

/// Result of [`MessageList::confirm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The pending entry became the confirmed row.
    Replaced,
    /// The row was already listed; the pending entry was dropped.
    Collapsed,
    /// No pending entry with that id exists.
    Missing,
}

/// Ordered, de-duplicated message list of one conversation.
#[derive(Debug, Default, Clone)]
pub struct MessageList {
    entries: Vec<MessageEntry>,
}

impl MessageList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a fetched history snapshot into the list.
    ///
    /// Rows are `Read` if the store says so, `Delivered` otherwise. Rows
    /// already listed only move their state forward, and confirmed entries
    /// the snapshot lacks are kept, so a push merged while the fetch was
    /// in flight survives.
    ///
    /// While a sender has pending entries, that many of their newest rows
    /// created at or after the oldest of those entries are held back:
    /// they are the inserts still on their way to [`confirm`], which adds
    /// them. Returns how many rows were held back.
    ///
    /// [`confirm`]: Self::confirm
    pub fn merge_history(&mut self, rows: Vec<MessageRow>) -> usize {
        let mut waiting: HashMap<PublicId, (usize, Timestamp)> = HashMap::new();
        for entry in &self.entries {
            if matches!(entry.id, EntryId::Pending(_)) {
                let slot = waiting
                    .entry(entry.sender.clone())
                    .or_insert((0, entry.created_at));
                slot.0 += 1;
                slot.1 = slot.1.min(entry.created_at);
            }
        }

        let mut rows = rows;
        rows.sort_by_key(|r| r.created_at);

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        let mut held = 0;
        for row in rows.into_iter().rev() {
            if !seen.insert(row.id) {
                continue;
            }
            if self.contains(&row.id) {
                self.advance(&row.id, history_state(&row));
                continue;
            }
            if let Some((count, since)) = waiting.get_mut(&row.sender_id)
                && *count > 0
                && row.created_at >= *since
            {
                *count -= 1;
                held += 1;
                continue;
            }
            fresh.push(row);
        }

        for row in fresh.into_iter().rev() {
            let state = history_state(&row);
            self.insert_ordered(MessageEntry::confirmed(row, state));
        }
        held
    }

    /// Appends an optimistic entry for text the user just submitted.
    pub fn append_pending(
        &mut self,
        local_id: LocalId,
        sender: PublicId,
        text: String,
        is_encrypted: bool,
        created_at: Timestamp,
    ) {
        self.insert_ordered(MessageEntry {
            id: EntryId::Pending(local_id),
            sender,
            body: Body::Plain(text),
            created_at,
            is_encrypted,
            state: DeliveryState::Pending,
        });
    }

    /// Swaps the pending entry `local_id` for the store's `row`.
    ///
    /// The confirmed entry is repositioned by the row's `created_at`. If
    /// the row is already listed (a reload raced the insert), the pending
    /// entry is simply dropped.
    pub fn confirm(&mut self, local_id: LocalId, row: MessageRow) -> ConfirmOutcome {
        let Some(index) = self.position(EntryId::Pending(local_id)) else {
            return ConfirmOutcome::Missing;
        };
        self.entries.remove(index);

        if let Some(existing) = self.position(EntryId::Confirmed(row.id)) {
            self.entries[existing].state.advance_to(DeliveryState::Sent);
            return ConfirmOutcome::Collapsed;
        }

        self.insert_ordered(MessageEntry::confirmed(row, DeliveryState::Sent));
        ConfirmOutcome::Replaced
    }

    /// Removes the pending entry `local_id`. Other entries are untouched.
    pub fn evict(&mut self, local_id: LocalId) -> Option<MessageEntry> {
        self.position(EntryId::Pending(local_id))
            .map(|index| self.entries.remove(index))
    }

    /// Adds a row delivered by the realtime channel as `Delivered`.
    ///
    /// Idempotent by confirmed id.
    pub fn merge_remote(&mut self, row: MessageRow) -> MergeOutcome {
        if self.contains(&row.id) {
            return MergeOutcome::Duplicate;
        }
        self.insert_ordered(MessageEntry::confirmed(row, DeliveryState::Delivered));
        MergeOutcome::Inserted
    }

    /// Moves a confirmed entry forward to `state`. Returns whether it moved.
    pub fn advance(&mut self, id: &MessageId, state: DeliveryState) -> bool {
        self.entries
            .iter_mut()
            .find(|e| e.message_id().as_ref() == Some(id))
            .is_some_and(|e| e.state.advance_to(state))
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.iter().any(|e| e.message_id().as_ref() == Some(id))
    }

    #[must_use]
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encryption flag of the newest entry.
    #[must_use]
    pub fn last_encrypted_flag(&self) -> Option<bool> {
        self.entries.last().map(|e| e.is_encrypted)
    }

    fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Inserts after every entry with `created_at <= entry.created_at`.
    fn insert_ordered(&mut self, entry: MessageEntry) {
        let index = self
            .entries
            .partition_point(|e| e.created_at <= entry.created_at);
        self.entries.insert(index, entry);
    }
}

fn history_state(row: &MessageRow) -> DeliveryState {
    if row.read {
        DeliveryState::Read
    } else {
        DeliveryState::Delivered
    }
}
