//! Accounts, wallets and the thread list.
//!
//! [`Directory`] covers everything around a conversation: signing up and in,
//! registering extra wallets, starting a chat with an address, listing
//! threads with previews, and searching profiles.

use ledgerchat_proto::message::{MessageRow, PublicId, Timestamp};
use ledgerchat_proto::profile::{NewProfile, NewWallet, Profile, WalletRecord};
use ledgerchat_proto::thread::{ParticipantPair, Thread};

use crate::crypto;
use crate::session::{IdentityMode, Session, SessionError};
use crate::store::{MessageStore, ProfileStore, StoreError, ThreadStore};
use crate::wallet::{WalletError, WalletIdentity, WalletKeys};

/// Name given to the wallet created at sign-up.
pub const DEFAULT_WALLET_NAME: &str = "Main Wallet";

/// Maximum number of profiles returned by a search.
pub const SEARCH_LIMIT: usize = 10;

/// Preview label for a participant without a profile.
pub const UNKNOWN_USER: &str = "Unknown User";

/// Preview text for a thread without messages.
pub const NO_MESSAGES: &str = "No messages yet";

/// Why a recipient was rejected before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("please enter a recipient address")]
    EmptyRecipient,

    #[error("invalid address format: {0}")]
    MalformedAddress(String),

    #[error("address {0} is not registered")]
    UnknownRecipient(PublicId),

    #[error("cannot start a chat with yourself")]
    SelfChat,
}

/// Errors returned by [`Directory`] operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The input was rejected before any write.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The username is already registered.
    #[error("username {0} is already taken")]
    UsernameTaken(String),

    /// The username is blank.
    #[error("username must not be empty")]
    InvalidUsername,

    /// No profile matches the given credentials.
    #[error("invalid username or email")]
    InvalidCredentials,

    /// The seed does not derive the given address.
    #[error("seed does not match address")]
    InvalidSeed,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// A profile with its registered wallets, ready for
/// [`Session::activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub profile: Profile,
    pub wallets: Vec<WalletRecord>,
}

/// Result of [`Directory::sign_up`].
#[derive(Debug)]
pub struct Registration {
    pub account: Account,
    /// The new wallet's keys. The seed is shown to the user once and never
    /// stored.
    pub keys: WalletKeys,
}

/// One row of the thread list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPreview {
    pub thread: Thread,
    /// The other participant.
    pub participant: PublicId,
    /// Their username, or [`UNKNOWN_USER`].
    pub participant_username: String,
    /// Newest message text, or [`NO_MESSAGES`].
    pub last_message: String,
    /// Time of the newest message, or the thread's creation time.
    pub timestamp: Timestamp,
    /// Messages from the other participant not yet read.
    pub unread: usize,
}

/// Account and thread-list operations over a backend store.
pub struct Directory<S, W>
where
    S: ProfileStore + ThreadStore + MessageStore,
    W: WalletIdentity,
{
    store: S,
    wallet: W,
}

impl<S, W> Directory<S, W>
where
    S: ProfileStore + ThreadStore + MessageStore,
    W: WalletIdentity,
{
    pub const fn new(store: S, wallet: W) -> Self {
        Self { store, wallet }
    }

    /// Creates a wallet and a profile bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UsernameTaken`] if the name is registered,
    /// [`DirectoryError::InvalidUsername`] if it is blank, or a store or
    /// wallet error.
    pub async fn sign_up(
        &self,
        username: &str,
        email: Option<&str>,
    ) -> Result<Registration, DirectoryError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DirectoryError::InvalidUsername);
        }

        let keys = self.wallet.generate_identity()?;
        let profile = self
            .store
            .insert_profile(NewProfile {
                username: username.to_string(),
                email: email.map(str::to_string),
                address: Some(keys.public_address.clone()),
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => DirectoryError::UsernameTaken(username.to_string()),
                other => DirectoryError::Store(other),
            })?;

        let wallet = self
            .store
            .save_wallet(NewWallet {
                user_id: profile.id,
                address: keys.public_address.clone(),
                name: DEFAULT_WALLET_NAME.to_string(),
            })
            .await?;

        tracing::info!(%username, address = %keys.public_address, "account created");
        Ok(Registration {
            account: Account {
                profile,
                wallets: vec![wallet],
            },
            keys,
        })
    }

    /// Signs in with username and email.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidCredentials`] if no profile matches.
    pub async fn login_with_password(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Account, DirectoryError> {
        let profile = self
            .store
            .profile_by_login(username.trim(), email.trim())
            .await?
            .ok_or(DirectoryError::InvalidCredentials)?;
        self.account_for(profile).await
    }

    /// Signs in by proving ownership of `address` with its seed.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError::MalformedAddress`], [`DirectoryError::InvalidSeed`],
    /// or [`DirectoryError::InvalidCredentials`] if no profile uses the address.
    pub async fn login_with_seed(
        &self,
        seed: &str,
        address: &str,
    ) -> Result<Account, DirectoryError> {
        let address = address.trim();
        if !self.wallet.is_valid_address_format(address) {
            return Err(ValidationError::MalformedAddress(address.to_string()).into());
        }
        let address = PublicId::new(address);
        if !self.wallet.validate_seed(seed.trim(), &address) {
            return Err(DirectoryError::InvalidSeed);
        }

        let profile = self
            .store
            .profile_by_address(&address)
            .await?
            .ok_or(DirectoryError::InvalidCredentials)?;
        self.account_for(profile).await
    }

    /// Generates another wallet for the signed-in user and adds it to the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns a session error if nobody is signed in or the session only
    /// allows one wallet; nothing is written in that case.
    pub async fn create_wallet(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<WalletKeys, DirectoryError> {
        let user = session.user().ok_or(SessionError::NotActive)?;
        if session.identity_mode() == IdentityMode::SingleWallet
            && let Some(existing) = session.snapshot().wallets.first()
        {
            return Err(SessionError::WalletLimit(existing.address.clone()).into());
        }

        let keys = self.wallet.generate_identity()?;
        let record = self
            .store
            .save_wallet(NewWallet {
                user_id: user.id,
                address: keys.public_address.clone(),
                name: name.to_string(),
            })
            .await?;
        session.add_wallet(record)?;
        tracing::info!(address = %keys.public_address, "wallet registered");
        Ok(keys)
    }

    /// Opens (finding or creating) the thread with `recipient`.
    ///
    /// Every check runs before anything is written.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty, malformed, unknown, or
    /// own address.
    pub async fn start_chat(
        &self,
        session: &Session,
        recipient: &str,
    ) -> Result<Thread, DirectoryError> {
        let me = session.current_identity()?;

        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(ValidationError::EmptyRecipient.into());
        }
        if !self.wallet.is_valid_address_format(recipient) {
            return Err(ValidationError::MalformedAddress(recipient.to_string()).into());
        }
        let recipient = PublicId::new(recipient);

        let owner = match self.store.wallet_by_address(&recipient).await? {
            Some(wallet) => Some(wallet.user_id),
            None => self
                .store
                .profile_by_address(&recipient)
                .await?
                .map(|p| p.id),
        };
        let Some(owner) = owner else {
            return Err(ValidationError::UnknownRecipient(recipient).into());
        };

        let own_account = session.user().is_some_and(|u| u.id == owner);
        if own_account || session.is_self(&recipient) {
            return Err(ValidationError::SelfChat.into());
        }

        self.open_thread(me, recipient).await
    }

    /// Finds the thread between `a` and `b`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup or insert fails.
    pub async fn open_thread(&self, a: PublicId, b: PublicId) -> Result<Thread, DirectoryError> {
        let pair = ParticipantPair::new(a, b);
        if let Some(thread) = self.store.find_thread(&pair).await? {
            return Ok(thread);
        }
        match self.store.insert_thread(&pair).await {
            Ok(thread) => {
                tracing::info!(thread = %thread.id, "thread created");
                Ok(thread)
            }
            // Lost a race with the other participant.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_thread(&pair)
                .await?
                .ok_or_else(|| StoreError::NotFound("thread after conflict".into()).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the current identity's threads, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns a session error if nobody is signed in, or a store error.
    pub async fn thread_previews(
        &self,
        session: &Session,
    ) -> Result<Vec<ThreadPreview>, DirectoryError> {
        let me = session.current_identity()?;
        let threads = self.store.threads_for(&me).await?;
        if threads.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = threads.iter().map(|t| t.id).collect();
        let rows = self.store.latest_messages(&ids).await?;

        let mut previews = Vec::with_capacity(threads.len());
        for thread in threads {
            let Some(participant) = thread.other_participant(&me).cloned() else {
                continue;
            };
            let participant_username = match self.store.profile_by_address(&participant).await? {
                Some(profile) => profile.username,
                None => UNKNOWN_USER.to_string(),
            };

            let in_thread: Vec<&MessageRow> =
                rows.iter().filter(|r| r.thread_id == thread.id).collect();
            let unread = in_thread
                .iter()
                .filter(|r| !r.read && !session.is_self(&r.sender_id))
                .count();
            let (last_message, timestamp) = match in_thread.first() {
                Some(row) => (preview_text(&thread, row), row.created_at),
                None => (NO_MESSAGES.to_string(), thread.created_at),
            };

            previews.push(ThreadPreview {
                thread,
                participant,
                participant_username,
                last_message,
                timestamp,
                unread,
            });
        }
        Ok(previews)
    }

    /// Finds up to [`SEARCH_LIMIT`] profiles whose username contains
    /// `query`, excluding the current identity.
    ///
    /// # Errors
    ///
    /// Returns a session error if nobody is signed in, or a store error.
    pub async fn search_profiles(
        &self,
        session: &Session,
        query: &str,
    ) -> Result<Vec<Profile>, DirectoryError> {
        let me = session.current_identity()?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.search_profiles(query, &me, SEARCH_LIMIT).await?)
    }

    async fn account_for(&self, profile: Profile) -> Result<Account, DirectoryError> {
        let mut wallets = self.store.wallets_for_user(&profile.id).await?;
        if let Some(primary) = &profile.address {
            wallets.sort_by_key(|w| &w.address != primary);
        }
        tracing::info!(username = %profile.username, wallets = wallets.len(), "signed in");
        Ok(Account { profile, wallets })
    }
}

/// Readable preview of a row; envelopes are opened with the recipient key.
fn preview_text(thread: &Thread, row: &MessageRow) -> String {
    if !row.is_encrypted {
        return row.content.clone();
    }
    let Some(recipient) = thread.other_participant(&row.sender_id) else {
        return crypto::UNDECRYPTABLE_PLACEHOLDER.to_string();
    };
    match crypto::derive_key(recipient.as_str(), Some(&thread.id.to_string())) {
        Ok(key) => crypto::decrypt_or_placeholder(&row.content, &key),
        Err(_) => crypto::UNDECRYPTABLE_PLACEHOLDER.to_string(),
    }
}
