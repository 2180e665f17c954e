//! SHA256 hashing and txid/block-hash byte order.
//!
//! Hashes are kept in internal (little-endian) byte order everywhere; only
//! display strings and SLP token ids use the reversed order.

use sha2::{Digest, Sha256};

/// SHA256(SHA256(data)), used for txids, block hashes and Base58Check.
#[inline]
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Flip a hash between internal and display byte order.
#[inline]
pub fn reverse_bytes(bytes: &[u8; 32]) -> [u8; 32] {
    let mut reversed = *bytes;
    reversed.reverse();
    reversed
}

/// Display hex of an internal-order hash, as block explorers show txids.
pub fn hash_to_display_hex(hash: &[u8; 32]) -> String {
    hex::encode(reverse_bytes(hash))
}

/// Parse display hex back into internal byte order.
///
/// Returns `None` unless the input is exactly 64 hex characters.
pub fn hash_from_display_hex(display: &str) -> Option<[u8; 32]> {
    let bytes: [u8; 32] = hex::decode(display).ok()?.try_into().ok()?;
    Some(reverse_bytes(&bytes))
}
