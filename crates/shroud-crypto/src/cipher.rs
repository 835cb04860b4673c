//! AES-256-GCM sealing and opening of single blocks

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use shroud_core::{Error, Result};

use crate::{BLOCK_OVERHEAD, FILE_ID_SIZE, IV_SIZE, KEY_SIZE};

/// The process-wide 256-bit symmetric key. Zeroized on drop.
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Decode the configured key: exactly 64 hex characters.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let decoded = hex::decode(hex_str)
            .map_err(|e| Error::Config(format!("encryption_key is not valid hex: {e}")))?;
        let bytes: [u8; KEY_SIZE] = decoded.try_into().map_err(|v: Vec<u8>| {
            Error::Config(format!(
                "encryption_key must decode to {KEY_SIZE} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Random 16-byte value generated once per upload and embedded at the head
/// of every chunk belonging to that upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(pub [u8; FILE_ID_SIZE]);

impl FileId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; FILE_ID_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; FILE_ID_SIZE] = slice.try_into().map_err(|_| {
            Error::Integrity(format!(
                "file id must be {FILE_ID_SIZE} bytes, got {}",
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FILE_ID_SIZE] {
        &self.0
    }
}

/// Stateless block AEAD shared across requests. The key is immutable for
/// the process lifetime; concurrent use needs no synchronization.
pub struct BlockCipher {
    inner: Aes256Gcm,
}

impl BlockCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            inner: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Seal one plaintext block.
    ///
    /// Returns `[12-byte IV][ciphertext][16-byte tag]`; output length is
    /// always input length + 28. The IV is fresh OS randomness for every
    /// block; uniqueness comes from randomness alone.
    pub fn seal(&self, plaintext: &[u8], block_index: u64, file_id: &FileId) -> Result<Vec<u8>> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let aad = build_aad(block_index, file_id);
        let ciphertext = self
            .inner
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| Error::Integrity(format!("block encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(IV_SIZE + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open one sealed block.
    ///
    /// `block_index` and `file_id` must match the values used at seal time;
    /// any mismatch, truncation, or bit flip fails the tag check.
    pub fn open(&self, sealed: &[u8], block_index: u64, file_id: &FileId) -> Result<Vec<u8>> {
        if sealed.len() < BLOCK_OVERHEAD {
            return Err(Error::Integrity(format!(
                "sealed block too short: {} bytes (minimum {BLOCK_OVERHEAD})",
                sealed.len()
            )));
        }

        let (iv, ciphertext) = sealed.split_at(IV_SIZE);
        let aad = build_aad(block_index, file_id);

        self.inner
            .decrypt(
                Nonce::from_slice(iv),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                Error::Integrity(
                    "block decryption failed: corrupted data or wrong block_index/file_id".into(),
                )
            })
    }
}

/// AAD: block_index (8 bytes LE) || file_id (16 bytes)
fn build_aad(block_index: u64, file_id: &FileId) -> [u8; 8 + FILE_ID_SIZE] {
    let mut aad = [0u8; 8 + FILE_ID_SIZE];
    aad[..8].copy_from_slice(&block_index.to_le_bytes());
    aad[8..].copy_from_slice(file_id.as_bytes());
    aad
}
