//! The signed-in user's session.
//!
//! A [`Session`] is constructed once with its identity and auth variants and
//! handed to every view that needs to know "who am I" via `Arc<Session>`.
//! Its lifecycle is `Init -> Active -> Disposed`. The local snapshot can be
//! persisted with [`SessionFile`] so a restart keeps the user signed in.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ledgerchat_proto::message::PublicId;
use ledgerchat_proto::profile::{Profile, WalletRecord};

/// How many wallets a user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
    /// Exactly one wallet; the identity is that wallet's address.
    #[default]
    SingleWallet,
    /// Several wallets; one is current, all count as "self".
    MultiWallet,
}

/// How the user proves who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMode {
    /// Username plus email.
    #[default]
    #[serde(rename = "password")]
    PasswordLogin,
    /// Wallet seed plus address.
    #[serde(rename = "seed")]
    SeedLogin,
}

/// Lifecycle phase of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, nobody signed in yet.
    Init,
    /// A user is signed in.
    Active,
    /// Signed out; the session can no longer be used.
    Disposed,
}

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a signed-in user.
    #[error("no user is signed in")]
    NotActive,

    /// The session was already activated.
    #[error("session is already active")]
    AlreadyActive,

    /// The session has been disposed.
    #[error("session has been disposed")]
    Disposed,

    /// The signed-in user has no wallet to act as.
    #[error("signed-in user has no wallet identity")]
    NoIdentity,

    /// Single-wallet sessions cannot hold a second wallet.
    #[error("single-wallet session already has wallet {0}")]
    WalletLimit(PublicId),

    /// The wallet is not registered to this session.
    #[error("wallet {0} does not belong to this session")]
    UnknownWallet(PublicId),

    /// Reading or writing the session file failed.
    #[error("session file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session file could not be parsed.
    #[error("session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Everything the session knows about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The signed-in profile.
    pub user: Option<Profile>,
    /// Wallets registered to the user.
    #[serde(default)]
    pub wallets: Vec<WalletRecord>,
    /// Address currently acting as the local identity.
    pub current_wallet: Option<PublicId>,
    /// Whether new messages are encrypted unless the user says otherwise.
    #[serde(default)]
    pub encrypt_by_default: bool,
}

struct SessionState {
    phase: SessionPhase,
    snapshot: SessionSnapshot,
}

/// The injected "current user" context.
pub struct Session {
    identity_mode: IdentityMode,
    auth_mode: AuthMode,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("identity_mode", &self.identity_mode)
            .field("auth_mode", &self.auth_mode)
            .field("phase", &state.phase)
            .field("current_wallet", &state.snapshot.current_wallet)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session in the `Init` phase.
    #[must_use]
    pub fn new(identity_mode: IdentityMode, auth_mode: AuthMode) -> Self {
        Self {
            identity_mode,
            auth_mode,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Init,
                snapshot: SessionSnapshot::default(),
            }),
        }
    }

    /// Rebuilds a session from a persisted snapshot.
    ///
    /// The session is `Active` if the snapshot names a user, `Init`
    /// otherwise.
    #[must_use]
    pub fn restore(identity_mode: IdentityMode, auth_mode: AuthMode, snapshot: SessionSnapshot) -> Self {
        let phase = if snapshot.user.is_some() {
            SessionPhase::Active
        } else {
            SessionPhase::Init
        };
        Self {
            identity_mode,
            auth_mode,
            state: Mutex::new(SessionState { phase, snapshot }),
        }
    }

    /// Signs `user` in with their registered wallets.
    ///
    /// The current wallet is the profile's primary address if it is among
    /// `wallets`, otherwise the first wallet.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyActive`] / [`SessionError::Disposed`] outside `Init`.
    /// - [`SessionError::WalletLimit`] if a single-wallet session is given
    ///   more than one wallet.
    pub fn activate(&self, user: Profile, wallets: Vec<WalletRecord>) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        match state.phase {
            SessionPhase::Init => {}
            SessionPhase::Active => return Err(SessionError::AlreadyActive),
            SessionPhase::Disposed => return Err(SessionError::Disposed),
        }
        if self.identity_mode == IdentityMode::SingleWallet
            && let [first, _, ..] = wallets.as_slice()
        {
            return Err(SessionError::WalletLimit(first.address.clone()));
        }

        let current_wallet = user
            .address
            .as_ref()
            .filter(|primary| wallets.iter().any(|w| w.address == **primary))
            .or_else(|| wallets.first().map(|w| &w.address))
            .or(user.address.as_ref())
            .cloned();

        tracing::info!(
            username = %user.username,
            wallets = wallets.len(),
            identity_mode = ?self.identity_mode,
            "session activated"
        );
        state.snapshot.user = Some(user);
        state.snapshot.wallets = wallets;
        state.snapshot.current_wallet = current_wallet;
        state.phase = SessionPhase::Active;
        Ok(())
    }

    /// Signs out. Idempotent.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if state.phase != SessionPhase::Disposed {
            state.phase = SessionPhase::Disposed;
            state.snapshot = SessionSnapshot::default();
            tracing::info!("session disposed");
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    #[must_use]
    pub const fn identity_mode(&self) -> IdentityMode {
        self.identity_mode
    }

    #[must_use]
    pub const fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Returns a copy of the session's current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// The signed-in profile, if any.
    #[must_use]
    pub fn user(&self) -> Option<Profile> {
        self.state.lock().snapshot.user.clone()
    }

    /// The public identifier messages are sent as.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotActive`] / [`SessionError::Disposed`]
    /// outside `Active`, or [`SessionError::NoIdentity`] if the user has no
    /// wallet.
    pub fn current_identity(&self) -> Result<PublicId, SessionError> {
        let state = self.state.lock();
        Self::ensure_active(state.phase)?;
        state
            .snapshot
            .current_wallet
            .clone()
            .ok_or(SessionError::NoIdentity)
    }

    /// Whether `id` is the local user.
    ///
    /// In multi-wallet mode every owned wallet counts as self.
    #[must_use]
    pub fn is_self(&self, id: &PublicId) -> bool {
        let state = self.state.lock();
        if state.phase != SessionPhase::Active {
            return false;
        }
        let snapshot = &state.snapshot;
        match self.identity_mode {
            IdentityMode::SingleWallet => snapshot.current_wallet.as_ref() == Some(id),
            IdentityMode::MultiWallet => {
                snapshot.current_wallet.as_ref() == Some(id)
                    || snapshot.wallets.iter().any(|w| w.address == *id)
            }
        }
    }

    /// Adds a wallet to the session. Re-adding a known address is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WalletLimit`] if a single-wallet session
    /// already holds a different wallet.
    pub fn add_wallet(&self, wallet: WalletRecord) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_active(state.phase)?;

        let snapshot = &mut state.snapshot;
        if snapshot.wallets.iter().any(|w| w.address == wallet.address) {
            return Ok(());
        }
        if self.identity_mode == IdentityMode::SingleWallet
            && let Some(existing) = snapshot.wallets.first()
        {
            return Err(SessionError::WalletLimit(existing.address.clone()));
        }
        if snapshot.current_wallet.is_none() {
            snapshot.current_wallet = Some(wallet.address.clone());
        }
        tracing::debug!(address = %wallet.address, "wallet added to session");
        snapshot.wallets.push(wallet);
        Ok(())
    }

    /// Makes `address` the current identity.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownWallet`] if the address is not one of
    /// the session's wallets.
    pub fn select_wallet(&self, address: &PublicId) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        Self::ensure_active(state.phase)?;

        let known = state.snapshot.wallets.iter().any(|w| w.address == *address)
            || state.snapshot.current_wallet.as_ref() == Some(address);
        if !known {
            return Err(SessionError::UnknownWallet(address.clone()));
        }
        state.snapshot.current_wallet = Some(address.clone());
        Ok(())
    }

    #[must_use]
    pub fn encrypt_by_default(&self) -> bool {
        self.state.lock().snapshot.encrypt_by_default
    }

    pub fn set_encrypt_by_default(&self, encrypt: bool) {
        self.state.lock().snapshot.encrypt_by_default = encrypt;
    }

    const fn ensure_active(phase: SessionPhase) -> Result<(), SessionError> {
        match phase {
            SessionPhase::Active => Ok(()),
            SessionPhase::Init => Err(SessionError::NotActive),
            SessionPhase::Disposed => Err(SessionError::Disposed),
        }
    }
}

/// JSON file holding a [`SessionSnapshot`] between runs.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/ledgerchat/session.json`, if the platform has a data
    /// directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("ledgerchat").join("session.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot. A missing file means nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] or [`SessionError::Corrupt`].
    pub fn load(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the snapshot, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file cannot be written.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Deletes the file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
