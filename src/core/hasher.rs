//! BLAKE3 content hashing for canonical recipe text.

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Last four hex characters of a digest, used as a short display tag.
pub fn short_hash(digest: &str) -> &str {
    let start = digest.len().saturating_sub(4);
    &digest[start..]
}
