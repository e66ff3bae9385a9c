//! Textual ciphertext envelopes.
//!
//! Format: `lc1$aes-256-gcm$<salt>$<nonce>$<ciphertext>`, each binary part
//! standard base64. The per-envelope AES-256 key is HKDF-SHA256 over the
//! key material with the envelope's random salt, so one key material never
//! encrypts two envelopes under the same AES key and nonce.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{DecryptionError, EncryptionError, SymmetricKey};

/// Envelope format version tag.
pub const VERSION: &str = "lc1";

/// Cipher name recorded in the envelope.
pub const ALGORITHM: &str = "aes-256-gcm";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"ledgerchat message envelope v1";
const SEPARATOR: char = '$';

/// Encrypts `plaintext` into a self-contained envelope.
///
/// # Errors
///
/// Returns [`EncryptionError::EmptyPlaintext`] if `plaintext` is empty, or
/// [`EncryptionError::Cipher`] if key expansion or encryption fails.
pub fn encrypt(plaintext: &str, key: &SymmetricKey) -> Result<String, EncryptionError> {
    if plaintext.is_empty() {
        return Err(EncryptionError::EmptyPlaintext);
    }

    let salt: [u8; SALT_LEN] = rand::random();
    let nonce: [u8; NONCE_LEN] = rand::random();

    let cipher = envelope_cipher(key, &salt).map_err(EncryptionError::Cipher)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| EncryptionError::Cipher(e.to_string()))?;

    Ok([
        VERSION.to_string(),
        ALGORITHM.to_string(),
        STANDARD.encode(salt),
        STANDARD.encode(nonce),
        STANDARD.encode(ciphertext),
    ]
    .join(&SEPARATOR.to_string()))
}

/// Opens an envelope produced by [`encrypt`].
///
/// # Errors
///
/// Returns a [`DecryptionError`] if the envelope is malformed, uses an
/// unknown version or algorithm, fails authentication under `key`, or does
/// not decrypt to UTF-8.
pub fn decrypt(envelope: &str, key: &SymmetricKey) -> Result<String, DecryptionError> {
    let parts: Vec<&str> = envelope.split(SEPARATOR).collect();
    let [version, algorithm, salt, nonce, ciphertext] = parts.as_slice() else {
        return Err(DecryptionError::Malformed(format!(
            "expected 5 fields, got {}",
            parts.len()
        )));
    };

    if *version != VERSION {
        return Err(DecryptionError::Unsupported(format!("version {version}")));
    }
    if *algorithm != ALGORITHM {
        return Err(DecryptionError::Unsupported(format!("algorithm {algorithm}")));
    }

    let salt = decode_field(salt, "salt")?;
    let nonce = decode_field(nonce, "nonce")?;
    let ciphertext = decode_field(ciphertext, "ciphertext")?;

    if salt.len() != SALT_LEN {
        return Err(DecryptionError::Malformed(format!(
            "salt is {} bytes, expected {SALT_LEN}",
            salt.len()
        )));
    }
    if nonce.len() != NONCE_LEN {
        return Err(DecryptionError::Malformed(format!(
            "nonce is {} bytes, expected {NONCE_LEN}",
            nonce.len()
        )));
    }

    let cipher = envelope_cipher(key, &salt).map_err(DecryptionError::Malformed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| DecryptionError::Authentication)?;

    String::from_utf8(plaintext).map_err(|_| DecryptionError::InvalidText)
}

/// Expands key material and an envelope salt into an AES-256-GCM cipher.
fn envelope_cipher(key: &SymmetricKey, salt: &[u8]) -> Result<Aes256Gcm, String> {
    let hk = Hkdf::<Sha256>::new(Some(salt), key.material());
    let mut aes_key = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO, aes_key.as_mut_slice())
        .map_err(|e| format!("key expansion failed: {e}"))?;
    Aes256Gcm::new_from_slice(aes_key.as_slice()).map_err(|e| format!("invalid key: {e}"))
}

fn decode_field(field: &str, name: &str) -> Result<Vec<u8>, DecryptionError> {
    STANDARD
        .decode(field)
        .map_err(|e| DecryptionError::Malformed(format!("{name} is not base64: {e}")))
}
