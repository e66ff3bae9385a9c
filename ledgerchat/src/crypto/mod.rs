//! Message confidentiality for `LedgerChat`.
//!
//! Text is sealed into a self-contained string envelope with a symmetric
//! key derived from a *public* identifier (the recipient's wallet address),
//! optionally salted with the thread id. Anyone who knows the recipient's
//! address and the thread id can derive the same key, so this is
//! obfuscation against casual inspection of the store, not end-to-end
//! encryption.
//!
//! - [`keys::derive_key`] builds a [`SymmetricKey`].
//! - [`envelope::encrypt`] / [`envelope::decrypt`] seal and open envelopes.
//! - [`decrypt_or_placeholder`] is what display code calls: it never fails.

pub mod envelope;
pub mod keys;

use zeroize::Zeroizing;

pub use envelope::{decrypt, encrypt};
pub use keys::derive_key;

/// Text shown in place of a message whose envelope cannot be opened.
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[unable to decrypt]";

/// Errors that can occur while sealing a message.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    /// There is nothing to encrypt.
    #[error("plaintext is empty")]
    EmptyPlaintext,

    /// The key could not be derived from the given identifier.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The cipher rejected the input.
    #[error("encryption failed: {0}")]
    Cipher(String),
}

/// Errors that can occur while opening an envelope.
///
/// These are recoverable: display code substitutes
/// [`UNDECRYPTABLE_PLACEHOLDER`].
#[derive(Debug, thiserror::Error)]
pub enum DecryptionError {
    /// The envelope does not have the expected structure.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope names a version or algorithm this client cannot open.
    #[error("unsupported envelope: {0}")]
    Unsupported(String),

    /// Authentication failed (wrong key or tampered envelope).
    #[error("authentication failed (wrong key or tampered envelope)")]
    Authentication,

    /// The decrypted bytes are not valid UTF-8 text.
    #[error("decrypted bytes are not valid UTF-8")]
    InvalidText,
}

/// Symmetric key material derived from a public identifier.
///
/// The material is wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct SymmetricKey {
    material: Zeroizing<Vec<u8>>,
}

impl SymmetricKey {
    pub(crate) fn from_material(material: Vec<u8>) -> Self {
        Self {
            material: Zeroizing::new(material),
        }
    }

    pub(crate) fn material(&self) -> &[u8] {
        &self.material
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("material", &"<redacted>")
            .finish()
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.material() == other.material()
    }
}

impl Eq for SymmetricKey {}

/// Opens an envelope for display, substituting a placeholder on failure.
#[must_use]
pub fn decrypt_or_placeholder(envelope: &str, key: &SymmetricKey) -> String {
    match decrypt(envelope, key) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "envelope could not be opened, showing placeholder");
            UNDECRYPTABLE_PLACEHOLDER.to_string()
        }
    }
}
