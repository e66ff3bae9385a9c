//! Backend store contracts.
//!
//! The remote backend is a relational store with `messages`, `threads`,
//! `profiles` and `wallets` collections. The client reaches it only through
//! the traits below:
//!
//! - [`MessageStore`] inserts and reads message rows and flips read flags.
//! - [`ThreadStore`] finds, creates and lists two-party threads.
//! - [`ProfileStore`] manages profiles and the wallet registry.
//!
//! [`memory::InMemoryBackend`] implements all three for tests and the demo.

pub mod memory;

use std::future::Future;

use ledgerchat_proto::message::{MessageId, MessageRow, NewMessage, PublicId, ThreadId, Timestamp};
use ledgerchat_proto::profile::{NewProfile, NewWallet, Profile, UserId, WalletRecord};
use ledgerchat_proto::thread::{ParticipantPair, Thread};

pub use memory::InMemoryBackend;

/// Errors that can occur during backend store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read operation failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Message rows of the `messages` collection.
pub trait MessageStore: Send + Sync {
    /// Inserts a message. The store assigns the id and `created_at`.
    fn insert_message(
        &self,
        message: NewMessage,
    ) -> impl Future<Output = Result<MessageRow, StoreError>> + Send;

    /// Returns every message in a thread, oldest first.
    fn messages_in_thread(
        &self,
        thread: &ThreadId,
    ) -> impl Future<Output = Result<Vec<MessageRow>, StoreError>> + Send;

    /// Sets `read = true` on every listed message.
    ///
    /// Unknown ids are ignored.
    fn mark_read(&self, ids: &[MessageId]) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Rows of the `threads` collection.
pub trait ThreadStore: Send + Sync {
    /// Looks up the thread for a participant pair.
    fn find_thread(
        &self,
        pair: &ParticipantPair,
    ) -> impl Future<Output = Result<Option<Thread>, StoreError>> + Send;

    /// Creates a thread for a participant pair.
    ///
    /// Returns [`StoreError::Conflict`] if the pair already has one.
    fn insert_thread(
        &self,
        pair: &ParticipantPair,
    ) -> impl Future<Output = Result<Thread, StoreError>> + Send;

    /// Looks up a thread by id.
    fn thread(&self, id: &ThreadId) -> impl Future<Output = Result<Option<Thread>, StoreError>> + Send;

    /// Returns every thread `participant` takes part in, most recently
    /// active first.
    fn threads_for(
        &self,
        participant: &PublicId,
    ) -> impl Future<Output = Result<Vec<Thread>, StoreError>> + Send;

    /// Moves a thread's `last_message_at` forward to `at`.
    fn touch_thread(
        &self,
        id: &ThreadId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the messages of the given threads, newest first.
    fn latest_messages(
        &self,
        threads: &[ThreadId],
    ) -> impl Future<Output = Result<Vec<MessageRow>, StoreError>> + Send;
}

/// Rows of the `profiles` and `wallets` collections.
pub trait ProfileStore: Send + Sync {
    /// Creates a profile. Usernames are unique.
    fn insert_profile(
        &self,
        profile: NewProfile,
    ) -> impl Future<Output = Result<Profile, StoreError>> + Send;

    /// Finds the profile matching both username and email.
    fn profile_by_login(
        &self,
        username: &str,
        email: &str,
    ) -> impl Future<Output = Result<Option<Profile>, StoreError>> + Send;

    /// Finds the profile whose primary address is `address`.
    fn profile_by_address(
        &self,
        address: &PublicId,
    ) -> impl Future<Output = Result<Option<Profile>, StoreError>> + Send;

    /// Case-insensitive substring search on usernames.
    fn search_profiles(
        &self,
        query: &str,
        exclude: &PublicId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Profile>, StoreError>> + Send;

    /// Registers a wallet. Saving an already-registered address returns the
    /// existing record.
    fn save_wallet(
        &self,
        wallet: NewWallet,
    ) -> impl Future<Output = Result<WalletRecord, StoreError>> + Send;

    /// Looks up a registered wallet by address.
    fn wallet_by_address(
        &self,
        address: &PublicId,
    ) -> impl Future<Output = Result<Option<WalletRecord>, StoreError>> + Send;

    /// Every wallet registered to `user`, oldest first.
    fn wallets_for_user(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<WalletRecord>, StoreError>> + Send;
}
