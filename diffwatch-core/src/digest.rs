use sha1::{Digest as _, Sha1};

/// Stable fingerprint of extracted page content: hex SHA-1 of the UTF-8
/// bytes of `s`. 40 lowercase hex characters. Used only for equality
/// comparison between successive snapshots, never as a security primitive.
pub fn digest(s: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}
