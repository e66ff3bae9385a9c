//! In-memory implementation of the store contracts.
//!
//! Every collection lives behind one [`parking_lot::Mutex`] that is never
//! held across an await point. Inserted messages are published to the
//! attached [`RealtimeHub`], mirroring the backend's change feed. Fault,
//! latency and reply-delay switches let tests exercise rollback, timeout
//! and interleaving paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use ledgerchat_proto::message::{MessageId, MessageRow, NewMessage, PublicId, ThreadId, Timestamp};
use ledgerchat_proto::profile::{NewProfile, NewWallet, Profile, UserId, WalletRecord};
use ledgerchat_proto::thread::{ParticipantPair, Thread};

use super::{MessageStore, ProfileStore, StoreError, ThreadStore};
use crate::realtime::hub::RealtimeHub;

#[derive(Default)]
struct Tables {
    messages: Vec<MessageRow>,
    threads: Vec<Thread>,
    profiles: Vec<Profile>,
    wallets: Vec<WalletRecord>,
    last_insert_at: Option<Timestamp>,
}

impl Tables {
    /// Next insert time; never earlier than the previous insert.
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let at = self.last_insert_at.map_or(now, |last| last.max(now));
        self.last_insert_at = Some(at);
        at
    }
}

struct Inner {
    tables: Mutex<Tables>,
    hub: Option<RealtimeHub>,
    writes_failing: AtomicBool,
    reads_failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
    reply_delay: Mutex<Option<Duration>>,
    message_inserts: AtomicUsize,
}

/// Cloneable handle to an in-memory backend.
///
/// Clones share the same tables.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Creates an empty backend with no realtime feed.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty backend that publishes message inserts to `hub`.
    #[must_use]
    pub fn with_hub(hub: RealtimeHub) -> Self {
        Self::build(Some(hub))
    }

    fn build(hub: Option<RealtimeHub>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                hub,
                writes_failing: AtomicBool::new(false),
                reads_failing: AtomicBool::new(false),
                latency: Mutex::new(None),
                reply_delay: Mutex::new(None),
                message_inserts: AtomicUsize::new(0),
            }),
        }
    }

    /// Makes every write fail with [`StoreError::WriteFailed`].
    pub fn set_failing(&self, fail: bool) {
        self.inner.writes_failing.store(fail, Ordering::SeqCst);
    }

    /// Makes every read fail with [`StoreError::ReadFailed`].
    pub fn set_reads_failing(&self, fail: bool) {
        self.inner.reads_failing.store(fail, Ordering::SeqCst);
    }

    /// Delays every operation by `latency` (`None` to disable).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock() = latency;
    }

    /// Delays the reply of message operations by `delay` after they take
    /// effect (`None` to disable). An insert is stored and published, and a
    /// read has its snapshot, before the caller hears back.
    pub fn set_reply_delay(&self, delay: Option<Duration>) {
        *self.inner.reply_delay.lock() = delay;
    }

    /// Number of successful message inserts so far.
    #[must_use]
    pub fn message_insert_count(&self) -> usize {
        self.inner.message_inserts.load(Ordering::SeqCst)
    }

    /// Number of stored messages across all threads.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner.tables.lock().messages.len()
    }

    async fn simulate_latency(&self) {
        let latency = *self.inner.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
    }

    async fn delay_reply(&self) {
        let delay = *self.inner.reply_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn begin_write(&self, op: &str) -> Result<(), StoreError> {
        self.simulate_latency().await;
        if self.inner.writes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed(format!("{op}: backend rejected write")));
        }
        Ok(())
    }

    async fn begin_read(&self, op: &str) -> Result<(), StoreError> {
        self.simulate_latency().await;
        if self.inner.reads_failing.load(Ordering::SeqCst) {
            return Err(StoreError::ReadFailed(format!("{op}: backend unreachable")));
        }
        Ok(())
    }
}

impl MessageStore for InMemoryBackend {
    async fn insert_message(&self, message: NewMessage) -> Result<MessageRow, StoreError> {
        self.begin_write("insert_message").await?;

        let row = {
            let mut tables = self.inner.tables.lock();
            if !tables.threads.iter().any(|t| t.id == message.thread_id) {
                return Err(StoreError::NotFound(format!("thread {}", message.thread_id)));
            }
            let row = MessageRow {
                id: MessageId::generate(),
                thread_id: message.thread_id,
                sender_id: message.sender_id,
                content: message.content,
                created_at: tables.next_timestamp(),
                is_encrypted: message.is_encrypted,
                read: false,
            };
            tables.messages.push(row.clone());
            row
        };
        self.inner.message_inserts.fetch_add(1, Ordering::SeqCst);

        if let Some(hub) = &self.inner.hub {
            hub.publish(&row);
        }
        self.delay_reply().await;
        Ok(row)
    }

    async fn messages_in_thread(&self, thread: &ThreadId) -> Result<Vec<MessageRow>, StoreError> {
        self.begin_read("messages_in_thread").await?;

        let mut rows: Vec<MessageRow> = self
            .inner
            .tables
            .lock()
            .messages
            .iter()
            .filter(|m| m.thread_id == *thread)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        self.delay_reply().await;
        Ok(rows)
    }

    async fn mark_read(&self, ids: &[MessageId]) -> Result<(), StoreError> {
        self.begin_write("mark_read").await?;

        {
            let mut tables = self.inner.tables.lock();
            for row in tables.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
                row.read = true;
            }
        }
        self.delay_reply().await;
        Ok(())
    }
}

impl ThreadStore for InMemoryBackend {
    async fn find_thread(&self, pair: &ParticipantPair) -> Result<Option<Thread>, StoreError> {
        self.begin_read("find_thread").await?;

        Ok(self
            .inner
            .tables
            .lock()
            .threads
            .iter()
            .find(|t| t.pair() == *pair)
            .cloned())
    }

    async fn insert_thread(&self, pair: &ParticipantPair) -> Result<Thread, StoreError> {
        self.begin_write("insert_thread").await?;

        let mut tables = self.inner.tables.lock();
        if tables.threads.iter().any(|t| t.pair() == *pair) {
            return Err(StoreError::Conflict(format!(
                "thread between {} and {} already exists",
                pair.first(),
                pair.second()
            )));
        }
        let now = Timestamp::now();
        let thread = Thread {
            id: ThreadId::generate(),
            participant1: pair.first().clone(),
            participant2: pair.second().clone(),
            last_message_at: now,
            created_at: now,
        };
        tables.threads.push(thread.clone());
        Ok(thread)
    }

    async fn thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        self.begin_read("thread").await?;

        Ok(self
            .inner
            .tables
            .lock()
            .threads
            .iter()
            .find(|t| t.id == *id)
            .cloned())
    }

    async fn threads_for(&self, participant: &PublicId) -> Result<Vec<Thread>, StoreError> {
        self.begin_read("threads_for").await?;

        let mut threads: Vec<Thread> = self
            .inner
            .tables
            .lock()
            .threads
            .iter()
            .filter(|t| t.involves(participant))
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(threads)
    }

    async fn touch_thread(&self, id: &ThreadId, at: Timestamp) -> Result<(), StoreError> {
        self.begin_write("touch_thread").await?;

        let mut tables = self.inner.tables.lock();
        let thread = tables
            .threads
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| StoreError::NotFound(format!("thread {id}")))?;
        thread.last_message_at = thread.last_message_at.max(at);
        Ok(())
    }

    async fn latest_messages(&self, threads: &[ThreadId]) -> Result<Vec<MessageRow>, StoreError> {
        self.begin_read("latest_messages").await?;

        // Reverse insertion order first so the stable sort keeps the most
        // recently inserted row ahead on equal timestamps.
        let mut rows: Vec<MessageRow> = self
            .inner
            .tables
            .lock()
            .messages
            .iter()
            .rev()
            .filter(|m| threads.contains(&m.thread_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

impl ProfileStore for InMemoryBackend {
    async fn insert_profile(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        self.begin_write("insert_profile").await?;

        let mut tables = self.inner.tables.lock();
        if tables.profiles.iter().any(|p| p.username == profile.username) {
            return Err(StoreError::Conflict(format!(
                "username {} is taken",
                profile.username
            )));
        }
        let created = Profile {
            id: UserId::generate(),
            username: profile.username,
            email: profile.email,
            address: profile.address,
            created_at: Timestamp::now(),
            is_encrypted: false,
        };
        tables.profiles.push(created.clone());
        Ok(created)
    }

    async fn profile_by_login(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Profile>, StoreError> {
        self.begin_read("profile_by_login").await?;

        Ok(self
            .inner
            .tables
            .lock()
            .profiles
            .iter()
            .find(|p| p.username == username && p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn profile_by_address(&self, address: &PublicId) -> Result<Option<Profile>, StoreError> {
        self.begin_read("profile_by_address").await?;

        Ok(self
            .inner
            .tables
            .lock()
            .profiles
            .iter()
            .find(|p| p.address.as_ref() == Some(address))
            .cloned())
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude: &PublicId,
        limit: usize,
    ) -> Result<Vec<Profile>, StoreError> {
        self.begin_read("search_profiles").await?;

        let needle = query.to_lowercase();
        Ok(self
            .inner
            .tables
            .lock()
            .profiles
            .iter()
            .filter(|p| p.address.as_ref() != Some(exclude))
            .filter(|p| p.username.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_wallet(&self, wallet: NewWallet) -> Result<WalletRecord, StoreError> {
        self.begin_write("save_wallet").await?;

        let mut tables = self.inner.tables.lock();
        if let Some(existing) = tables.wallets.iter().find(|w| w.address == wallet.address) {
            return Ok(existing.clone());
        }
        let record = WalletRecord {
            id: Uuid::new_v4(),
            user_id: wallet.user_id,
            address: wallet.address,
            name: wallet.name,
            created_at: Timestamp::now(),
        };
        tables.wallets.push(record.clone());
        Ok(record)
    }

    async fn wallet_by_address(
        &self,
        address: &PublicId,
    ) -> Result<Option<WalletRecord>, StoreError> {
        self.begin_read("wallet_by_address").await?;

        Ok(self
            .inner
            .tables
            .lock()
            .wallets
            .iter()
            .find(|w| w.address == *address)
            .cloned())
    }

    async fn wallets_for_user(&self, user: &UserId) -> Result<Vec<WalletRecord>, StoreError> {
        self.begin_read("wallets_for_user").await?;

        Ok(self
            .inner
            .tables
            .lock()
            .wallets
            .iter()
            .filter(|w| w.user_id == *user)
            .cloned()
            .collect())
    }
}
