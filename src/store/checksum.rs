//! SHA-256 checksum strings for file content
//!
//! Format: `SHA256: ` followed by lowercase hex. Checksums are always computed
//! over plaintext, never ciphertext, so an encrypted file still verifies after
//! decryption.

use sha2::{Digest, Sha256};

const PREFIX: &str = "SHA256: ";

/// Computes the checksum string for a content buffer.
///
/// Deterministic: the same input always produces the same output.
pub fn compute_checksum(data: &[u8]) -> String {
    format!("{}{:x}", PREFIX, Sha256::digest(data))
}

/// Extracts the hex digest from a formatted checksum string.
///
/// Returns `None` if the format is invalid.
pub fn parse_checksum(formatted: &str) -> Option<&str> {
    let hex = formatted.strip_prefix(PREFIX)?;
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex)
    } else {
        None
    }
}
