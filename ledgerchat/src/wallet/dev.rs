//! Deterministic development wallet.
//!
//! Produces seeds and addresses with the right *shape* so the rest of the
//! client can be exercised without a ledger library. Addresses are derived
//! from SHA-256 of the seed; there is no checksum and no real key pair.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use ledgerchat_proto::address::{self, BASE58_ALPHABET};
use ledgerchat_proto::message::PublicId;

use super::{WalletError, WalletIdentity, WalletKeys};

/// Number of random bytes behind a seed.
const SEED_ENTROPY: usize = 16;

/// Characters in the address body (within the accepted 25..=34 range).
const ADDRESS_BODY_LEN: usize = 33;

/// Seed-to-address wallet for tests and the offline demo.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevWallet;

impl DevWallet {
    /// Creates a development wallet.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Derives the address for a seed.
    #[must_use]
    pub fn address_for_seed(seed: &str) -> PublicId {
        let digest = Sha256::digest(seed.as_bytes());
        let body: String = digest
            .iter()
            .cycle()
            .take(ADDRESS_BODY_LEN)
            .map(|b| alphabet_char(*b))
            .collect();
        PublicId::new(format!("r{body}"))
    }

    /// Builds a seed string from raw entropy.
    fn encode_seed(entropy: &[u8]) -> Zeroizing<String> {
        let mut seed = Zeroizing::new(String::with_capacity(entropy.len() + 1));
        seed.push('s');
        seed.extend(entropy.iter().map(|b| alphabet_char(*b)));
        seed
    }
}

fn alphabet_char(byte: u8) -> char {
    char::from(BASE58_ALPHABET[usize::from(byte) % BASE58_ALPHABET.len()])
}

impl WalletIdentity for DevWallet {
    fn generate_identity(&self) -> Result<WalletKeys, WalletError> {
        let entropy: Zeroizing<[u8; SEED_ENTROPY]> = Zeroizing::new(rand::random());
        let private_seed = Self::encode_seed(entropy.as_slice());
        let public_address = Self::address_for_seed(&private_seed);
        if !address::is_valid_address_format(public_address.as_str()) {
            return Err(WalletError::Generation(
                "derived address has an invalid shape".into(),
            ));
        }
        tracing::debug!(address = %public_address, "generated development wallet");
        Ok(WalletKeys {
            public_address,
            private_seed,
        })
    }

    fn validate_seed(&self, seed: &str, address: &PublicId) -> bool {
        seed.starts_with('s') && Self::address_for_seed(seed) == *address
    }

    fn is_valid_address_format(&self, address: &str) -> bool {
        address::is_valid_address_format(address)
    }
}
