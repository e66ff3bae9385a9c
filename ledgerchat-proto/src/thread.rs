//! Conversation threads between exactly two public identifiers.

use serde::{Deserialize, Serialize};

use crate::message::{PublicId, ThreadId, Timestamp};

/// Two participants in canonical (sorted) order.
///
/// Thread lookup is symmetric: `ParticipantPair::new(a, b)` equals
/// `ParticipantPair::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    first: PublicId,
    second: PublicId,
}

impl ParticipantPair {
    /// Builds the canonical pair for two identifiers.
    #[must_use]
    pub fn new(a: PublicId, b: PublicId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// The lexicographically smaller participant.
    #[must_use]
    pub const fn first(&self) -> &PublicId {
        &self.first
    }

    /// The lexicographically larger participant.
    #[must_use]
    pub const fn second(&self) -> &PublicId {
        &self.second
    }

    /// Whether both sides are the same identifier.
    #[must_use]
    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }
}

/// A row of the `threads` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Store-assigned identifier.
    pub id: ThreadId,
    /// Smaller participant of the sorted pair.
    pub participant1: PublicId,
    /// Larger participant of the sorted pair.
    pub participant2: PublicId,
    /// Time of the most recent message, used to order thread lists.
    pub last_message_at: Timestamp,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Thread {
    /// Returns the canonical participant pair of this thread.
    #[must_use]
    pub fn pair(&self) -> ParticipantPair {
        ParticipantPair::new(self.participant1.clone(), self.participant2.clone())
    }

    /// Whether `id` is one of the two participants.
    #[must_use]
    pub fn involves(&self, id: &PublicId) -> bool {
        self.participant1 == *id || self.participant2 == *id
    }

    /// Returns the participant that is not `me`, or `None` if `me` is not
    /// part of this thread.
    #[must_use]
    pub fn other_participant(&self, me: &PublicId) -> Option<&PublicId> {
        if self.participant1 == *me {
            Some(&self.participant2)
        } else if self.participant2 == *me {
            Some(&self.participant1)
        } else {
            None
        }
    }
}
