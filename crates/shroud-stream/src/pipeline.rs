//! The two-task pipelines moving bytes between the network and the store
//!
//! Encrypt-on-write: a spawned producer reads plaintext in block-size
//! increments, seals each block, and sends it down a bounded pipe; the
//! consumer streams the pipe into an object-store put. Decrypt-on-read is
//! the mirror image, driven pull-style through [`DecryptReader`].
//!
//! Framing invariant: the writer seals exact `block_size`-byte plaintext
//! blocks (short only at end of stream), so the reader recovers exactly one
//! sealed block per `block_size + 28` byte read. Writer block size and
//! reader buffer size MUST be the same configured value.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use shroud_core::{Error, Result};
use shroud_crypto::{BlockCipher, FileId, BLOCK_OVERHEAD, FILE_ID_SIZE};
use shroud_storage::ObjectStore;

use crate::PIPE_DEPTH;

/// Read until `buf` is full or the source is exhausted. Returns the number
/// of bytes read; a short count means end of stream.
pub(crate) async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Encrypt `source` into a single stored object.
///
/// Writes the 16-byte file id, then sealed blocks with per-chunk indices
/// starting at 0. With `budget = Some(t)`, sealing stops once the next block
/// would overflow `t` on-wire bytes (a final residual block fills the budget
/// exactly); with `None` the whole source becomes one object.
///
/// Returns the store's upload tag, the source (for the orchestrator to
/// continue with the next chunk), and whether the source reached EOF.
pub async fn encrypt_to_object<R>(
    store: &ObjectStore,
    cipher: &Arc<BlockCipher>,
    name: &str,
    file_id: FileId,
    source: R,
    budget: Option<u64>,
    block_size: usize,
) -> Result<(String, R, bool)>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Bytes>(PIPE_DEPTH);
    let producer = tokio::spawn(seal_blocks(
        cipher.clone(),
        file_id,
        source,
        budget,
        block_size,
        tx,
    ));

    let put_result = pump_to_store(store, name, rx).await;
    let seal_result = producer
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!("encrypt task panicked: {e}")))?;

    let etag = put_result?;
    let (source, eof) = seal_result?;
    Ok((etag, source, eof))
}

/// Producer half of the upload pipeline: the chunk state machine.
///
/// Charges the 16-byte header up front, then seals full blocks while the
/// budget allows, then one residual block sized to fill the remaining budget
/// exactly. A zero or short read is source EOF and ends the upload.
async fn seal_blocks<R>(
    cipher: Arc<BlockCipher>,
    file_id: FileId,
    mut source: R,
    budget: Option<u64>,
    block_size: usize,
    pipe: mpsc::Sender<Bytes>,
) -> Result<(R, bool)>
where
    R: AsyncRead + Unpin,
{
    if pipe
        .send(Bytes::copy_from_slice(file_id.as_bytes()))
        .await
        .is_err()
    {
        return Err(Error::ClientAborted);
    }

    let mut used = FILE_ID_SIZE as u64;
    let mut index = 0u64;
    let mut eof = false;
    let mut buf = vec![0u8; block_size];

    loop {
        let want = match budget {
            None => block_size,
            Some(t) => {
                let remaining = t.saturating_sub(used);
                if remaining <= BLOCK_OVERHEAD as u64 {
                    // Chunk full; the orchestrator rolls to the next one.
                    break;
                }
                if remaining >= (block_size + BLOCK_OVERHEAD) as u64 {
                    block_size
                } else {
                    remaining as usize - BLOCK_OVERHEAD
                }
            }
        };

        let n = read_full(&mut source, &mut buf[..want]).await?;
        if n == 0 {
            eof = true;
            break;
        }

        let sealed = cipher.seal(&buf[..n], index, &file_id)?;
        used += sealed.len() as u64;
        if pipe.send(sealed.into()).await.is_err() {
            return Err(Error::ClientAborted);
        }

        if n < want {
            eof = true;
            break;
        }
        index += 1;
    }

    Ok((source, eof))
}

/// Consumer half of the upload pipeline: stream the pipe into a put.
async fn pump_to_store(
    store: &ObjectStore,
    name: &str,
    mut pipe: mpsc::Receiver<Bytes>,
) -> Result<String> {
    let mut writer = store.put(name).await?;
    while let Some(bytes) = pipe.recv().await {
        writer.write(bytes).await?;
    }
    writer.close().await
}

/// Pull-style decryptor over one stored object's byte stream.
///
/// Reads the 16-byte file id header lazily, then yields one plaintext block
/// per call, opening sealed blocks with indices 0, 1, 2, … and the file id
/// as associated data. A short read marks the final block; `None` means the
/// object is fully consumed.
pub struct DecryptReader<R> {
    reader: R,
    cipher: Arc<BlockCipher>,
    file_id: Option<FileId>,
    next_index: u64,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> DecryptReader<R> {
    pub fn new(cipher: Arc<BlockCipher>, block_size: usize, reader: R) -> Self {
        Self {
            reader,
            cipher,
            file_id: None,
            next_index: 0,
            buf: vec![0u8; block_size + BLOCK_OVERHEAD],
        }
    }

    async fn read_file_id(&mut self) -> Result<FileId> {
        match self.file_id {
            Some(id) => Ok(id),
            None => {
                let mut header = [0u8; FILE_ID_SIZE];
                let n = read_full(&mut self.reader, &mut header).await?;
                if n < FILE_ID_SIZE {
                    return Err(Error::Integrity(format!(
                        "stored object too short for file id header: {n} bytes"
                    )));
                }
                let id = FileId(header);
                self.file_id = Some(id);
                Ok(id)
            }
        }
    }

    /// Decrypt and return the next plaintext block, or `None` at the end of
    /// the object. Fails with `Integrity` on any tampered or misplaced
    /// block.
    pub async fn next_block(&mut self) -> Result<Option<Bytes>> {
        let file_id = self.read_file_id().await?;

        let n = read_full(&mut self.reader, &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        let plaintext = self.cipher.open(&self.buf[..n], self.next_index, &file_id)?;
        self.next_index += 1;
        Ok(Some(plaintext.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::EncryptionKey;
    use std::io::Cursor;

    fn test_cipher() -> Arc<BlockCipher> {
        Arc::new(BlockCipher::new(&EncryptionKey::from_bytes([9u8; 32])))
    }

    fn memory_store() -> ObjectStore {
        let op = opendal::Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        ObjectStore::new(op)
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        use rand::RngCore;
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    async fn decrypt_all(store: &ObjectStore, cipher: &Arc<BlockCipher>, name: &str) -> Vec<u8> {
        let reader = store.get(name).await.unwrap();
        let mut dec = DecryptReader::new(cipher.clone(), 16384, reader);
        let mut out = Vec::new();
        while let Some(block) = dec.next_block().await.unwrap() {
            out.extend_from_slice(&block);
        }
        out
    }

    #[tokio::test]
    async fn single_object_roundtrip_with_exact_bloat() {
        let store = memory_store();
        let cipher = test_cipher();
        let data = random_bytes(50_000);

        let file_id = FileId::generate();
        let (_, _, eof) = encrypt_to_object(
            &store,
            &cipher,
            "blob",
            file_id,
            Cursor::new(data.clone()),
            None,
            16384,
        )
        .await
        .unwrap();
        assert!(eof);

        // 3 full blocks + one 848-byte residual: 16 + 4*28 + 50000
        let stored = store.operator().read("blob").await.unwrap().to_vec();
        assert_eq!(stored.len(), 50_128);
        assert_eq!(&stored[..FILE_ID_SIZE], file_id.as_bytes());

        assert_eq!(decrypt_all(&store, &cipher, "blob").await, data);
    }

    #[tokio::test]
    async fn empty_source_stores_header_only() {
        let store = memory_store();
        let cipher = test_cipher();

        encrypt_to_object(
            &store,
            &cipher,
            "empty",
            FileId::generate(),
            Cursor::new(Vec::new()),
            None,
            16384,
        )
        .await
        .unwrap();

        let stored = store.operator().read("empty").await.unwrap().to_vec();
        assert_eq!(stored.len(), FILE_ID_SIZE);
        assert!(decrypt_all(&store, &cipher, "empty").await.is_empty());
    }

    #[tokio::test]
    async fn budget_stops_chunk_and_returns_source() {
        let store = memory_store();
        let cipher = test_cipher();
        let block_size = 16usize;
        // Header + two full sealed blocks
        let budget = (FILE_ID_SIZE + 2 * (block_size + BLOCK_OVERHEAD)) as u64;
        let data = random_bytes(100);

        let (_, mut source, eof) = encrypt_to_object(
            &store,
            &cipher,
            "c0",
            FileId::generate(),
            Cursor::new(data.clone()),
            Some(budget),
            block_size,
        )
        .await
        .unwrap();

        assert!(!eof, "source still has bytes left");
        let stored = store.operator().read("c0").await.unwrap().to_vec();
        assert_eq!(stored.len() as u64, budget);

        // The source resumes exactly where the chunk ended
        let mut remainder = vec![0u8; 100 - 2 * block_size];
        let n = read_full(&mut source, &mut remainder).await.unwrap();
        assert_eq!(n, remainder.len());
        assert_eq!(remainder, data[2 * block_size..]);
    }

    #[tokio::test]
    async fn residual_block_fills_budget_exactly() {
        let store = memory_store();
        let cipher = test_cipher();
        let block_size = 64usize;
        // Room for one full block plus a 10-byte residual
        let budget = (FILE_ID_SIZE + (block_size + BLOCK_OVERHEAD) + (10 + BLOCK_OVERHEAD)) as u64;
        let data = random_bytes(block_size + 50);

        let (_, _, eof) = encrypt_to_object(
            &store,
            &cipher,
            "c0",
            FileId::generate(),
            Cursor::new(data),
            Some(budget),
            block_size,
        )
        .await
        .unwrap();

        assert!(!eof);
        let stored = store.operator().read("c0").await.unwrap().to_vec();
        assert_eq!(stored.len() as u64, budget);
    }

    #[tokio::test]
    async fn tampered_object_fails_decryption() {
        let store = memory_store();
        let cipher = test_cipher();

        encrypt_to_object(
            &store,
            &cipher,
            "blob",
            FileId::generate(),
            Cursor::new(random_bytes(1000)),
            None,
            16384,
        )
        .await
        .unwrap();

        let mut stored = store.operator().read("blob").await.unwrap().to_vec();
        stored[100] ^= 0x01;
        store.operator().write("blob", stored).await.unwrap();

        let reader = store.get("blob").await.unwrap();
        let mut dec = DecryptReader::new(cipher.clone(), 16384, reader);
        assert!(matches!(
            dec.next_block().await,
            Err(shroud_core::Error::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn truncated_header_is_integrity_error() {
        let store = memory_store();
        let cipher = test_cipher();
        store.operator().write("stub", vec![0u8; 7]).await.unwrap();

        let reader = store.get("stub").await.unwrap();
        let mut dec = DecryptReader::new(cipher, 16384, reader);
        assert!(matches!(
            dec.next_block().await,
            Err(shroud_core::Error::Integrity(_))
        ));
    }
}
