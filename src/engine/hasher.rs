// Echograph Engine — Content Hasher
//
// Deterministic, order-sensitive, fixed-width 32-bit fingerprint of a string.
// Used both as the content-table dictionary key and as the identity check
// that keeps cached edges resolvable.

use sha2::{Digest, Sha256};

/// Hash a string to its 32-bit content fingerprint.
///
/// The fingerprint is the first four bytes of the SHA-256 digest, read
/// little-endian. Stable across processes and platforms; any change here
/// invalidates every persisted store and table.
pub fn content_hash(text: &str) -> u32 {
    let digest = Sha256::digest(text.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}
