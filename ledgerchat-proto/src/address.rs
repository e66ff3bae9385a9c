//! Ledger address format checks.
//!
//! Classic ledger addresses are an `r` followed by 25 to 34 characters of
//! the base58 alphabet (no `0`, `O`, `I` or `l`). This is a shape check
//! only; checksum verification belongs to the wallet library.

/// The base58 alphabet used by ledger addresses and seeds.
pub const BASE58_ALPHABET: &[u8; 58] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shortest accepted body length after the leading `r`.
pub const MIN_ADDRESS_BODY: usize = 25;

/// Longest accepted body length after the leading `r`.
pub const MAX_ADDRESS_BODY: usize = 34;

/// Returns `true` if `c` is in the base58 alphabet.
#[must_use]
pub const fn is_base58_char(c: u8) -> bool {
    matches!(c, b'1'..=b'9' | b'A'..=b'H' | b'J'..=b'N' | b'P'..=b'Z' | b'a'..=b'k' | b'm'..=b'z')
}

/// Returns `true` if `address` has the shape of a classic ledger address.
#[must_use]
pub fn is_valid_address_format(address: &str) -> bool {
    let Some(body) = address.strip_prefix('r') else {
        return false;
    };
    (MIN_ADDRESS_BODY..=MAX_ADDRESS_BODY).contains(&body.len())
        && body.bytes().all(is_base58_char)
}
