//! shroud-crypto: block-level authenticated encryption for stored objects
//!
//! Sealed block format (binary):
//! ```text
//! [12 bytes: random IV][N bytes: ciphertext][16 bytes: GCM tag]
//! AAD = block_index (8 bytes, little-endian) || file_id (16 bytes)
//! ```
//!
//! The AAD binds each block to its position within the chunk and to the
//! uploading file, preventing block reordering and cross-file substitution.
//! Every stored object carries the 16-byte file id once, followed by sealed
//! blocks back to back with no separators.

pub mod cipher;
pub mod frame;

pub use cipher::{BlockCipher, EncryptionKey, FileId};
pub use frame::{chunk_name, chunk_prefix, min_chunk_budget, parse_size, sealed_len};

/// Size of the symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a per-block AES-GCM IV
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Per-block ciphertext overhead (IV + tag)
pub const BLOCK_OVERHEAD: usize = IV_SIZE + TAG_SIZE;

/// Size of the per-upload file identifier stored at the head of every chunk
pub const FILE_ID_SIZE: usize = 16;
