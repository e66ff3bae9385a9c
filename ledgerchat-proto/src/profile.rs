//! Rows of the `profiles` and `wallets` collections.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{PublicId, Timestamp};

/// Store-assigned identifier of a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `UserId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user profile: display identity bound to a wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Store-assigned identifier.
    pub id: UserId,
    /// Unique display name.
    pub username: String,
    /// Optional contact address used by password-style login.
    pub email: Option<String>,
    /// Primary wallet address.
    pub address: Option<PublicId>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Whether the user opted into encrypted messaging.
    #[serde(default)]
    pub is_encrypted: bool,
}

/// Insert payload for the `profiles` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    /// Requested display name; must be unique.
    pub username: String,
    /// Optional contact address.
    pub email: Option<String>,
    /// Primary wallet address.
    pub address: Option<PublicId>,
}

/// A wallet registered to a user.
///
/// Only the public address is stored. The private seed stays with the
/// user and never reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Owner of the wallet.
    pub user_id: UserId,
    /// Public ledger address.
    pub address: PublicId,
    /// Human-readable label.
    pub name: String,
    /// Registration time.
    pub created_at: Timestamp,
}

/// Insert payload for the `wallets` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWallet {
    /// Owner of the wallet.
    pub user_id: UserId,
    /// Public ledger address.
    pub address: PublicId,
    /// Human-readable label.
    pub name: String,
}
