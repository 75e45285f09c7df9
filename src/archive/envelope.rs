//! Sealed envelope format
//!
//! Every archive entry body is an envelope:
//!
//! ```text
//! magic (4) | version (1) | mode (1) | [salt (16)] | [nonce (12) | check (2)] | body
//! ```
//!
//! The body is the zstd-compressed plaintext, optionally encrypted. AES modes
//! carry a nonce and authenticate via the GCM tag; the legacy Standard mode
//! carries two password check bytes instead. One format across all modes, so
//! a reader with the correct password never needs to know the mode up front.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::errors::{ArchiveError, ArchiveResult};

const MAGIC: [u8; 4] = *b"TVLT";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const CHECK_LEN: usize = 2;

const MODE_PLAIN: u8 = 0;
const MODE_STANDARD: u8 = 1;
const MODE_AES128: u8 = 2;
const MODE_AES256: u8 = 3;

/// Encryption mode of a sealed envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Legacy keyed-XOR keystream. Weak; kept readable and writable for
    /// compatibility with old archives only.
    Standard,
    /// AES-128-GCM with Argon2id-derived key
    Aes128,
    /// AES-256-GCM with Argon2id-derived key
    Aes256,
}

impl EncryptionMode {
    fn mode_byte(self) -> u8 {
        match self {
            EncryptionMode::Standard => MODE_STANDARD,
            EncryptionMode::Aes128 => MODE_AES128,
            EncryptionMode::Aes256 => MODE_AES256,
        }
    }

    fn key_len(self) -> usize {
        match self {
            EncryptionMode::Standard => 32,
            EncryptionMode::Aes128 => 16,
            EncryptionMode::Aes256 => 32,
        }
    }
}

/// Parsed envelope header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub mode: Option<EncryptionMode>,
    /// offset of the body within the envelope
    pub body_offset: usize,
}

impl EnvelopeHeader {
    pub fn is_encrypted(&self) -> bool {
        self.mode.is_some()
    }
}

/// Parse and validate an envelope header without touching the body.
pub fn parse_header(data: &[u8]) -> ArchiveResult<EnvelopeHeader> {
    if data.len() < 6 {
        return Err(ArchiveError::Corrupt("envelope truncated".into()));
    }
    if data[0..4] != MAGIC {
        return Err(ArchiveError::Corrupt("bad envelope magic".into()));
    }
    if data[4] != VERSION {
        return Err(ArchiveError::Corrupt(format!(
            "unsupported envelope version {}",
            data[4]
        )));
    }
    let (mode, header_len) = match data[5] {
        MODE_PLAIN => (None, 6),
        MODE_STANDARD => (Some(EncryptionMode::Standard), 6 + SALT_LEN + CHECK_LEN),
        MODE_AES128 => (Some(EncryptionMode::Aes128), 6 + SALT_LEN + NONCE_LEN),
        MODE_AES256 => (Some(EncryptionMode::Aes256), 6 + SALT_LEN + NONCE_LEN),
        other => {
            return Err(ArchiveError::Corrupt(format!(
                "unknown envelope mode {}",
                other
            )))
        }
    };
    if data.len() < header_len {
        return Err(ArchiveError::Corrupt("envelope header truncated".into()));
    }
    Ok(EnvelopeHeader {
        mode,
        body_offset: header_len,
    })
}

/// Seal plaintext without encryption (compression only).
pub fn seal_plain(plaintext: &[u8]) -> ArchiveResult<Vec<u8>> {
    let body = compress(plaintext)?;
    let mut out = Vec::with_capacity(6 + body.len());
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.push(MODE_PLAIN);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Seal plaintext under a password in the given mode.
pub fn seal_encrypted(
    plaintext: &[u8],
    password: &str,
    mode: EncryptionMode,
) -> ArchiveResult<Vec<u8>> {
    let compressed = compress(plaintext)?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut out = Vec::with_capacity(6 + SALT_LEN + NONCE_LEN + compressed.len() + 16);
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.push(mode.mode_byte());
    out.extend_from_slice(&salt);

    match mode {
        EncryptionMode::Standard => {
            let key = legacy_key(password, &salt);
            out.extend_from_slice(&legacy_check(&key));
            let mut body = compressed;
            legacy_xor(&key, &mut body);
            out.extend_from_slice(&body);
        }
        EncryptionMode::Aes128 | EncryptionMode::Aes256 => {
            let mut nonce = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            out.extend_from_slice(&nonce);
            let key = derive_key(password, &salt, mode)?;
            let ciphertext = aead_encrypt(mode, &key, &nonce, &compressed)?;
            out.extend_from_slice(&ciphertext);
        }
    }
    Ok(out)
}

/// Open an envelope, reproducing the original plaintext byte-for-byte.
///
/// A wrong or missing password fails with [`ArchiveError::WrongPassword`] and
/// never yields truncated or corrupted bytes; damaged data fails with
/// [`ArchiveError::Corrupt`].
pub fn open(envelope: &[u8], password: Option<&str>) -> ArchiveResult<Vec<u8>> {
    let header = parse_header(envelope)?;
    let body = &envelope[header.body_offset..];

    let mode = match header.mode {
        None => return decompress(body),
        Some(mode) => mode,
    };
    let password = password.ok_or(ArchiveError::WrongPassword)?;
    let salt = &envelope[6..6 + SALT_LEN];

    match mode {
        EncryptionMode::Standard => {
            let key = legacy_key(password, salt);
            let check = &envelope[6 + SALT_LEN..6 + SALT_LEN + CHECK_LEN];
            if check != legacy_check(&key) {
                return Err(ArchiveError::WrongPassword);
            }
            let mut data = body.to_vec();
            legacy_xor(&key, &mut data);
            decompress(&data)
        }
        EncryptionMode::Aes128 | EncryptionMode::Aes256 => {
            let nonce_off = 6 + SALT_LEN;
            let nonce = &envelope[nonce_off..nonce_off + NONCE_LEN];
            let key = derive_key(password, salt, mode)?;
            // GCM cannot tell a wrong key from a flipped bit; both surface as
            // an authentication failure, which we report as WrongPassword
            let compressed =
                aead_decrypt(mode, &key, nonce, body).map_err(|_| ArchiveError::WrongPassword)?;
            decompress(&compressed)
        }
    }
}

fn compress(plaintext: &[u8]) -> ArchiveResult<Vec<u8>> {
    zstd::encode_all(plaintext, 0).map_err(ArchiveError::Io)
}

fn decompress(body: &[u8]) -> ArchiveResult<Vec<u8>> {
    zstd::decode_all(body).map_err(|e| ArchiveError::Corrupt(format!("decompression failed: {}", e)))
}

fn derive_key(password: &str, salt: &[u8], mode: EncryptionMode) -> ArchiveResult<Vec<u8>> {
    let mut key = vec![0u8; mode.key_len()];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| ArchiveError::Crypto(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn aead_encrypt(
    mode: EncryptionMode,
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
) -> ArchiveResult<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce);
    let result = match mode {
        EncryptionMode::Aes128 => Aes128Gcm::new_from_slice(key)
            .map_err(|e| ArchiveError::Crypto(e.to_string()))?
            .encrypt(nonce, plaintext),
        _ => Aes256Gcm::new_from_slice(key)
            .map_err(|e| ArchiveError::Crypto(e.to_string()))?
            .encrypt(nonce, plaintext),
    };
    result.map_err(|e| ArchiveError::Crypto(format!("encryption failed: {}", e)))
}

fn aead_decrypt(
    mode: EncryptionMode,
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    let nonce = Nonce::from_slice(nonce);
    match mode {
        EncryptionMode::Aes128 => {
            Aes128Gcm::new_from_slice(key).map_err(|_| aes_gcm::Error)?.decrypt(nonce, ciphertext)
        }
        _ => Aes256Gcm::new_from_slice(key).map_err(|_| aes_gcm::Error)?.decrypt(nonce, ciphertext),
    }
}

// Legacy Standard mode. SHA-256-chained keystream XOR with two password check
// bytes, mirroring the check-byte probe of classic zip encryption. Weak.

fn legacy_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

fn legacy_check(key: &[u8; 32]) -> [u8; CHECK_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(b"verify");
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

fn legacy_xor(key: &[u8; 32], data: &mut [u8]) {
    let mut counter: u64 = 0;
    for chunk in data.chunks_mut(32) {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();
        for (byte, k) in chunk.iter_mut().zip(block.iter()) {
            *byte ^= k;
        }
        counter += 1;
    }
}
