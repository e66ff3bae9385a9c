//! Chat application layer for `LedgerChat`.
//!
//! Contains the [`ConversationView`] which drives one open thread: it loads
//! history, runs the optimistic send pipeline (append pending -> encrypt ->
//! insert -> confirm or roll back), merges realtime pushes, and renders the
//! list for display with envelopes opened.
//!
//! All list mutations go through [`state::MessageList`] under a
//! `parking_lot` mutex that is never held across an await point, so each
//! one is atomic with respect to the other tasks touching the view.

pub mod draft;
pub mod state;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use ledgerchat_proto::message::{
    ContentError, MAX_MESSAGE_SIZE, MessageId, MessageRow, NewMessage, PublicId, Timestamp,
};
use ledgerchat_proto::thread::Thread;

use crate::crypto::{self, EncryptionError, SymmetricKey, UNDECRYPTABLE_PLACEHOLDER};
use crate::realtime::Subscription;
use crate::session::{Session, SessionError};
use crate::store::{MessageStore, StoreError, ThreadStore};

use draft::Draft;
use state::{Body, DeliveryState, EntryId, LocalId, MergeOutcome, MessageEntry, MessageList};

/// Errors that can occur when sending a message.
///
/// Every variant except [`SendError::Disposed`] means the optimistic entry
/// for this send has been removed again.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The stored content failed validation (too large).
    #[error("invalid content: {0}")]
    Content(#[from] ContentError),

    /// The text could not be sealed.
    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    /// The store rejected the insert.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The store did not answer in time.
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    /// The view was torn down.
    #[error("conversation view has been disposed")]
    Disposed,

    /// Nobody is signed in, or the user has no wallet.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The current identity is not part of this thread.
    #[error("{0} is not a participant of this thread")]
    NotParticipant(PublicId),

    /// The draft is already being sent.
    #[error("a send for this draft is already in flight")]
    InFlight,
}

/// Errors that can occur when loading history.
///
/// On any error the message list is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The store read failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The store did not answer in time.
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    /// The view was torn down.
    #[error("conversation view has been disposed")]
    Disposed,
}

/// Tunables for a [`ConversationView`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Upper bound on every store call.
    pub store_timeout: Duration,
    /// Largest stored content accepted, in bytes.
    pub max_message_size: usize,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            max_message_size: MAX_MESSAGE_SIZE,
            event_buffer: 64,
        }
    }
}

/// Events emitted by a [`ConversationView`] for UI notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// History replaced the list.
    HistoryLoaded {
        /// Number of rows loaded.
        count: usize,
    },
    /// The store accepted an optimistic entry.
    MessageConfirmed {
        local_id: LocalId,
        message_id: MessageId,
    },
    /// An optimistic entry was rolled back.
    MessageFailed {
        local_id: LocalId,
        /// Description of the failure.
        reason: String,
    },
    /// A realtime push added a message from the other participant.
    MessageReceived {
        message_id: MessageId,
    },
}

/// What [`ConversationView::on_remote_push`] did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Added to the list.
    Merged,
    /// Already listed.
    Duplicate,
    /// Sent by the local user; the submit path owns it.
    SelfOrigin,
    /// Belongs to another thread.
    ForeignThread,
    /// The view is torn down.
    Disposed,
}

/// A list entry ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub id: EntryId,
    pub sender: PublicId,
    /// Readable text; [`UNDECRYPTABLE_PLACEHOLDER`] if the envelope could
    /// not be opened.
    pub text: String,
    pub created_at: Timestamp,
    pub is_encrypted: bool,
    /// Whether the local user wrote it.
    pub is_own: bool,
    pub status: DeliveryState,
}

impl DisplayMessage {
    /// Formats `created_at` with a chrono pattern such as `%H:%M`.
    #[must_use]
    pub fn time_label(&self, pattern: &str) -> String {
        self.created_at.format(pattern)
    }
}

/// One open conversation.
///
/// Created per thread with the store, the injected [`Session`] and a
/// [`ChatConfig`]. Use [`dispose`](Self::dispose) on teardown: afterwards
/// nothing mutates the list, and completions of in-flight sends are
/// dropped.
pub struct ConversationView<S: MessageStore + ThreadStore> {
    store: S,
    session: Arc<Session>,
    thread: Thread,
    config: ChatConfig,
    list: Mutex<MessageList>,
    /// Recipient-derived keys, by recipient.
    keys: Mutex<HashMap<PublicId, SymmetricKey>>,
    focused: AtomicBool,
    disposed: watch::Sender<bool>,
    event_tx: mpsc::Sender<ConversationEvent>,
}

impl<S: MessageStore + ThreadStore> ConversationView<S> {
    /// Creates a view for `thread`.
    ///
    /// Returns the view and a receiver for [`ConversationEvent`]s that the
    /// UI layer should consume.
    pub fn new(
        store: S,
        session: Arc<Session>,
        thread: Thread,
        config: ChatConfig,
    ) -> (Self, mpsc::Receiver<ConversationEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (disposed, _) = watch::channel(false);
        let view = Self {
            store,
            session,
            thread,
            config,
            list: Mutex::new(MessageList::new()),
            keys: Mutex::new(HashMap::new()),
            focused: AtomicBool::new(true),
            disposed,
            event_tx,
        };
        (view, event_rx)
    }

    #[must_use]
    pub const fn thread(&self) -> &Thread {
        &self.thread
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Loads the thread's history and merges it into the list.
    ///
    /// Entries listed while the fetch was in flight are kept, and rows of
    /// sends that have not been confirmed yet are left to the send.
    ///
    /// Unread messages from the other participant are marked read (a
    /// failure there is logged, not returned), and the encryption flag of
    /// the newest message becomes the session's encryption preference.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the store fails or times out; the list is
    /// left untouched.
    pub async fn load_history(&self) -> Result<Vec<DisplayMessage>, LoadError> {
        if self.is_disposed() {
            return Err(LoadError::Disposed);
        }
        let thread_id = self.thread.id;
        let rows = tokio::time::timeout(
            self.config.store_timeout,
            self.store.messages_in_thread(&thread_id),
        )
        .await
        .map_err(|_| LoadError::Timeout(self.config.store_timeout))??;

        if self.is_disposed() {
            return Err(LoadError::Disposed);
        }

        let count = rows.len();
        let last_encrypted = rows.last().map(|r| r.is_encrypted);
        let unread: Vec<MessageId> = rows
            .iter()
            .filter(|r| !r.read && !self.session.is_self(&r.sender_id))
            .map(|r| r.id)
            .collect();

        let held = self.list.lock().merge_history(rows);
        if held > 0 {
            tracing::debug!(thread = %thread_id, held, "rows of in-flight sends left to confirm");
        }
        if let Some(encrypted) = last_encrypted {
            self.session.set_encrypt_by_default(encrypted);
        }
        tracing::info!(thread = %thread_id, count, unread = unread.len(), "history loaded");

        if !unread.is_empty() {
            self.mark_read(&unread).await;
        }

        self.emit(ConversationEvent::HistoryLoaded { count });
        Ok(self.messages())
    }

    /// Sends `text` to the other participant.
    ///
    /// Blank text is a no-op (`Ok(None)`, nothing reaches the store).
    /// Otherwise an optimistic entry is listed immediately and swapped for
    /// the stored row on success.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] after removing exactly this send's optimistic
    /// entry.
    pub async fn submit(&self, text: &str, encrypt: bool) -> Result<Option<EntryId>, SendError> {
        if self.is_disposed() {
            return Err(SendError::Disposed);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let sender = self.session.current_identity()?;
        let recipient = self
            .thread
            .other_participant(&sender)
            .cloned()
            .ok_or_else(|| SendError::NotParticipant(sender.clone()))?;

        let local_id = LocalId::next();
        self.list.lock().append_pending(
            local_id,
            sender.clone(),
            text.to_string(),
            encrypt,
            Timestamp::now(),
        );
        tracing::debug!(thread = %self.thread.id, %local_id, encrypt, "optimistic entry added");

        match self.deliver(text, encrypt, sender, &recipient).await {
            Ok(row) => Ok(Some(self.finish_send(local_id, row).await)),
            Err(e) => {
                self.roll_back(local_id, &e);
                Err(e)
            }
        }
    }

    /// Sends a draft, guarding against double submission.
    ///
    /// The draft is cleared on success and keeps its text on failure.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InFlight`] if the draft is already being sent,
    /// or the error from [`submit`](Self::submit).
    pub async fn send_draft(
        &self,
        draft: &mut Draft,
        encrypt: bool,
    ) -> Result<Option<EntryId>, SendError> {
        if draft.is_in_flight() {
            return Err(SendError::InFlight);
        }
        let Some(text) = draft.begin_send() else {
            return Ok(None);
        };
        match self.submit(&text, encrypt).await {
            Ok(id) => {
                draft.complete();
                Ok(id)
            }
            Err(e) => {
                draft.abort();
                Err(e)
            }
        }
    }

    /// Handles a row delivered by the realtime channel.
    ///
    /// Rows from other threads, rows sent by the local user, and rows
    /// already listed are ignored. A merged row is marked read straight
    /// away while the view is focused.
    pub async fn on_remote_push(&self, row: MessageRow) -> PushOutcome {
        let message_id = row.id;
        let outcome = self.accept_push(row);
        if outcome == PushOutcome::Merged && self.is_focused() {
            self.mark_read(&[message_id]).await;
        }
        outcome
    }

    /// Feeds `subscription` into the list until it closes or the view is
    /// disposed. The subscription is dropped on return.
    ///
    /// Pushes are merged as they arrive. Marking them read runs beside the
    /// subscription: ids merged while one mark-as-read is in flight are
    /// batched into the next.
    pub async fn pump(&self, mut subscription: Subscription) {
        let stop = disposed_signal(self.disposed.subscribe());
        tokio::pin!(stop);

        let mut unread: Vec<MessageId> = Vec::new();
        let mut marking: Option<Pin<Box<dyn Future<Output = bool> + Send + '_>>> = None;

        loop {
            if marking.is_none() && !unread.is_empty() {
                let ids = std::mem::take(&mut unread);
                marking = Some(Box::pin(async move { self.mark_read(&ids).await }));
            }

            tokio::select! {
                () = &mut stop => break,
                _ = async {
                    match marking.as_mut() {
                        Some(pending) => pending.await,
                        None => std::future::pending().await,
                    }
                } => {
                    marking = None;
                }
                next = subscription.next() => match next {
                    Some(row) => {
                        let message_id = row.id;
                        if self.accept_push(row) == PushOutcome::Merged && self.is_focused() {
                            unread.push(message_id);
                        }
                    }
                    None => {
                        if let Some(pending) = marking.take() {
                            pending.await;
                        }
                        if !unread.is_empty() {
                            self.mark_read(&unread).await;
                        }
                        break;
                    }
                },
            }
        }
        tracing::debug!(thread = %self.thread.id, topic = %subscription.topic(), "realtime pump stopped");
    }

    /// Snapshot of the list for rendering, envelopes opened.
    #[must_use]
    pub fn messages(&self) -> Vec<DisplayMessage> {
        let entries: Vec<MessageEntry> = self.list.lock().entries().to_vec();
        entries.into_iter().map(|e| self.display(e)).collect()
    }

    /// Number of listed entries, pending ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.lock().is_empty()
    }

    /// Whether the user is looking at this conversation.
    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    /// Tears the view down. Idempotent.
    pub fn dispose(&self) {
        if !self.disposed.send_replace(true) {
            tracing::info!(thread = %self.thread.id, "conversation view disposed");
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        *self.disposed.borrow()
    }

    /// Merges a pushed row into the list without touching the store.
    fn accept_push(&self, row: MessageRow) -> PushOutcome {
        if self.is_disposed() {
            return PushOutcome::Disposed;
        }
        if row.thread_id != self.thread.id {
            tracing::debug!(thread = %self.thread.id, other = %row.thread_id, "ignoring push for another thread");
            return PushOutcome::ForeignThread;
        }
        if self.session.is_self(&row.sender_id) {
            tracing::debug!(message_id = %row.id, "ignoring self-originated push");
            return PushOutcome::SelfOrigin;
        }

        let message_id = row.id;
        if self.list.lock().merge_remote(row) == MergeOutcome::Duplicate {
            tracing::debug!(%message_id, "duplicate push ignored");
            return PushOutcome::Duplicate;
        }
        self.emit(ConversationEvent::MessageReceived { message_id });
        PushOutcome::Merged
    }

    /// Encrypts, validates and inserts one message.
    async fn deliver(
        &self,
        text: &str,
        encrypt: bool,
        sender: PublicId,
        recipient: &PublicId,
    ) -> Result<MessageRow, SendError> {
        let content = if encrypt {
            crypto::encrypt(text, &self.key_for(recipient)?)?
        } else {
            text.to_string()
        };

        let message = NewMessage {
            thread_id: self.thread.id,
            sender_id: sender,
            content,
            is_encrypted: encrypt,
        };
        message.validate(self.config.max_message_size)?;

        let row = tokio::time::timeout(self.config.store_timeout, self.store.insert_message(message))
            .await
            .map_err(|_| SendError::Timeout(self.config.store_timeout))??;
        Ok(row)
    }

    async fn finish_send(&self, local_id: LocalId, row: MessageRow) -> EntryId {
        let message_id = row.id;
        let created_at = row.created_at;

        if self.is_disposed() {
            tracing::debug!(%local_id, %message_id, "view disposed, discarding send completion");
        } else {
            let outcome = self.list.lock().confirm(local_id, row);
            tracing::debug!(%local_id, %message_id, ?outcome, "optimistic entry confirmed");
            self.emit(ConversationEvent::MessageConfirmed {
                local_id,
                message_id,
            });
        }

        let touched = tokio::time::timeout(
            self.config.store_timeout,
            self.store.touch_thread(&self.thread.id, created_at),
        )
        .await;
        match touched {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(thread = %self.thread.id, error = %e, "could not update thread activity");
            }
            Err(_) => {
                tracing::warn!(thread = %self.thread.id, "thread activity update timed out");
            }
        }

        EntryId::Confirmed(message_id)
    }

    fn roll_back(&self, local_id: LocalId, error: &SendError) {
        tracing::warn!(
            thread = %self.thread.id,
            %local_id,
            error = %error,
            "send failed, removing optimistic entry"
        );
        if self.is_disposed() {
            return;
        }
        self.list.lock().evict(local_id);
        self.emit(ConversationEvent::MessageFailed {
            local_id,
            reason: error.to_string(),
        });
    }

    /// Marks `ids` read in the store, then in the list. Returns whether the
    /// store accepted it.
    async fn mark_read(&self, ids: &[MessageId]) -> bool {
        let result = tokio::time::timeout(self.config.store_timeout, self.store.mark_read(ids)).await;
        match result {
            Ok(Ok(())) => {
                if !self.is_disposed() {
                    let mut list = self.list.lock();
                    for id in ids {
                        list.advance(id, DeliveryState::Read);
                    }
                }
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(thread = %self.thread.id, count = ids.len(), error = %e, "mark-as-read failed");
                false
            }
            Err(_) => {
                tracing::warn!(thread = %self.thread.id, count = ids.len(), "mark-as-read timed out");
                false
            }
        }
    }

    /// Key for messages addressed to `recipient` in this thread.
    fn key_for(&self, recipient: &PublicId) -> Result<SymmetricKey, EncryptionError> {
        if let Some(key) = self.keys.lock().get(recipient) {
            return Ok(key.clone());
        }
        let salt = self.thread.id.to_string();
        let key = crypto::derive_key(recipient.as_str(), Some(&salt))?;
        self.keys.lock().insert(recipient.clone(), key.clone());
        Ok(key)
    }

    fn display(&self, entry: MessageEntry) -> DisplayMessage {
        let MessageEntry {
            id,
            sender,
            body,
            created_at,
            is_encrypted,
            state,
        } = entry;
        let text = match body {
            Body::Plain(text) => text,
            Body::Sealed(envelope) => self.open(&sender, &envelope),
        };
        DisplayMessage {
            id,
            is_own: self.session.is_self(&sender),
            sender,
            text,
            created_at,
            is_encrypted,
            status: state,
        }
    }

    /// Opens an envelope written by `sender`; the key belongs to the other
    /// participant.
    fn open(&self, sender: &PublicId, envelope: &str) -> String {
        let Some(recipient) = self.thread.other_participant(sender) else {
            tracing::debug!(%sender, "sender is not a participant, cannot pick a key");
            return UNDECRYPTABLE_PLACEHOLDER.to_string();
        };
        match self.key_for(recipient) {
            Ok(key) => crypto::decrypt_or_placeholder(envelope, &key),
            Err(e) => {
                tracing::debug!(error = %e, "no key for envelope");
                UNDECRYPTABLE_PLACEHOLDER.to_string()
            }
        }
    }

    fn emit(&self, event: ConversationEvent) {
        // Best-effort: a slow UI misses events, not messages.
        let _ = self.event_tx.try_send(event);
    }
}

/// Resolves once the watched flag becomes `true` (or its sender is gone).
async fn disposed_signal(mut disposed: watch::Receiver<bool>) {
    loop {
        if *disposed.borrow_and_update() {
            return;
        }
        if disposed.changed().await.is_err() {
            return;
        }
    }
}
