//! Key derivation from public identifiers.
//!
//! With a salt (the thread id), the salt is hashed with SHA-256 and used to
//! stretch the identifier through PBKDF2-HMAC-SHA256. The resulting key is
//! kept in its hex form, which is what envelopes are keyed with. Without a
//! salt, the identifier string itself is the key material.

use sha2::{Digest, Sha256};

use super::{EncryptionError, SymmetricKey};

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 1000;

/// Derived key size in bytes (256 bits).
pub const DERIVED_KEY_LEN: usize = 32;

/// Derives the symmetric key for a public identifier.
///
/// Deterministic: the same `(public_id, salt)` always yields the same key.
///
/// # Errors
///
/// Returns [`EncryptionError::KeyDerivation`] if `public_id` is empty.
pub fn derive_key(public_id: &str, salt: Option<&str>) -> Result<SymmetricKey, EncryptionError> {
    if public_id.is_empty() {
        return Err(EncryptionError::KeyDerivation(
            "public identifier is empty".into(),
        ));
    }

    let Some(salt) = salt else {
        return Ok(SymmetricKey::from_material(public_id.as_bytes().to_vec()));
    };

    let hashed_salt = hex::encode(Sha256::digest(salt.as_bytes()));
    let mut derived = zeroize::Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        public_id.as_bytes(),
        hashed_salt.as_bytes(),
        PBKDF2_ITERATIONS,
        derived.as_mut_slice(),
    );

    Ok(SymmetricKey::from_material(
        hex::encode(derived.as_slice()).into_bytes(),
    ))
}
