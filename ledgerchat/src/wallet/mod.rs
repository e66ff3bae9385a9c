//! Wallet identity contract.
//!
//! Key generation and address derivation belong to an external ledger
//! library. The chat core only needs the public address (as a routing
//! identifier and as key material); the private seed is used solely by
//! seed-based login to prove ownership of an address.
//!
//! [`dev::DevWallet`] is a self-consistent stand-in for tests and the demo.

pub mod dev;

use zeroize::Zeroizing;

use ledgerchat_proto::message::PublicId;

/// Errors reported by a wallet implementation.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Identity generation failed.
    #[error("wallet generation failed: {0}")]
    Generation(String),
}

/// A freshly generated wallet identity.
///
/// The seed is wiped from memory when this value is dropped.
pub struct WalletKeys {
    /// Public ledger address.
    pub public_address: PublicId,
    /// Private seed; never stored by the backend and never logged.
    pub private_seed: Zeroizing<String>,
}

impl std::fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKeys")
            .field("public_address", &self.public_address)
            .field("private_seed", &"<redacted>")
            .finish()
    }
}

/// Operations the chat core needs from a ledger wallet library.
pub trait WalletIdentity: Send + Sync {
    /// Generates a new key pair.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Generation`] if the library fails.
    fn generate_identity(&self) -> Result<WalletKeys, WalletError>;

    /// Returns `true` if `seed` derives `address`.
    fn validate_seed(&self, seed: &str, address: &PublicId) -> bool;

    /// Returns `true` if `address` has a valid address shape.
    fn is_valid_address_format(&self, address: &str) -> bool;
}
