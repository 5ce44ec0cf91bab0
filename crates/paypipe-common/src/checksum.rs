//! Content digests used for idempotency keys and schema drift detection

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stable identifier derived from raw bytes. Used when a payload carries no id.
pub fn stable_hash_id(payload: &[u8]) -> String {
    sha256_hex(payload)
}

/// Digest of a sorted key set, joined with `|`.
///
/// Two writes with the same set of top-level keys produce the same hash no
/// matter the record order, so a change between runs signals schema drift.
pub fn schema_hash<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let sorted: BTreeSet<&str> = keys.into_iter().collect();
    let joined = sorted.into_iter().collect::<Vec<_>>().join("|");
    sha256_hex(joined.as_bytes())
}
