//! Download orchestration: streaming single-object decryption, and the
//! parallel fan-out/reassembly path for chunked files.
//!
//! Chunked downloads run N worker tasks; worker k owns chunks k, k+N,
//! k+2N, … and a single-slot channel toward the reassembler. The slot is
//! the backpressure: a worker cannot start its next fetch until the
//! reassembler has consumed its previous chunk, so at most N chunks are in
//! flight while the client still sees bytes in strict order.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use shroud_core::{Error, Result};
use shroud_crypto::{chunk_name, chunk_prefix, BlockCipher};
use shroud_storage::ObjectStore;

use crate::pipeline::DecryptReader;
use crate::PIPE_DEPTH;

/// The decrypted byte stream handed to the HTTP edge. An `Err` item aborts
/// the response mid-transfer; integrity failures are surfaced, never
/// silently truncated.
pub type PlaintextStream = mpsc::Receiver<io::Result<Bytes>>;

/// Stream one stored object's plaintext. Fails with `NotFound` before any
/// body byte is produced when the object does not exist.
pub async fn download_plain(
    store: &ObjectStore,
    cipher: &Arc<BlockCipher>,
    name: &str,
    block_size: usize,
) -> Result<PlaintextStream> {
    let reader = store.get(name).await?;
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    let mut decrypt = DecryptReader::new(cipher.clone(), block_size, reader);

    tokio::spawn(async move {
        loop {
            match decrypt.next_block().await {
                Ok(Some(block)) => {
                    if tx.send(Ok(block)).await.is_err() {
                        debug!("client went away mid-download");
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "download pipeline failed");
                    let _ = tx.send(Err(io::Error::other(e))).await;
                    return;
                }
            }
        }
    });

    Ok(rx)
}

/// Stream the reassembled plaintext of a chunked file, fetching chunks with
/// `workers` parallel tasks. Fails with `NotFound` when no chunk matches
/// the file's prefix.
pub async fn download_chunked(
    store: &ObjectStore,
    cipher: &Arc<BlockCipher>,
    name: &str,
    block_size: usize,
    workers: usize,
) -> Result<PlaintextStream> {
    let chunk_count = store.list(&chunk_prefix(name)).await?.len();
    if chunk_count == 0 {
        return Err(Error::NotFound(format!("no chunks stored for `{name}`")));
    }

    let workers = workers.max(1);
    debug!(name, chunk_count, workers, "starting chunked download");

    // One single-slot channel per worker: ordered delivery with at most
    // `workers` chunks in flight.
    let mut slots = Vec::with_capacity(workers);
    for k in 0..workers {
        let (tx, rx) = mpsc::channel::<Result<Bytes>>(1);
        slots.push(rx);
        tokio::spawn(fetch_assigned_chunks(
            store.clone(),
            cipher.clone(),
            name.to_string(),
            block_size,
            k,
            workers,
            chunk_count,
            tx,
        ));
    }

    let (body_tx, body_rx) = mpsc::channel(PIPE_DEPTH);
    tokio::spawn(reassemble(slots, chunk_count, body_tx));
    Ok(body_rx)
}

/// Download worker: fetch and decrypt chunks `k, k + stride, k + 2·stride, …`
/// in ascending order, parking each on the single-slot channel until the
/// reassembler takes it.
#[allow(clippy::too_many_arguments)]
async fn fetch_assigned_chunks(
    store: ObjectStore,
    cipher: Arc<BlockCipher>,
    name: String,
    block_size: usize,
    worker: usize,
    stride: usize,
    chunk_count: usize,
    slot: mpsc::Sender<Result<Bytes>>,
) {
    let mut index = worker;
    while index < chunk_count {
        // Names are rebuilt from the decimal index; the store's name-sorted
        // listing puts chunk10 before chunk2 and cannot be trusted for order.
        let object = chunk_name(&name, index as u64);
        let result = fetch_chunk(&store, &cipher, &object, block_size).await;
        let failed = result.is_err();
        if slot.send(result).await.is_err() {
            debug!(worker, "reassembler gone, stopping");
            return;
        }
        if failed {
            return;
        }
        index += stride;
    }
}

/// Fetch one chunk object and decrypt it whole.
async fn fetch_chunk(
    store: &ObjectStore,
    cipher: &Arc<BlockCipher>,
    object: &str,
    block_size: usize,
) -> Result<Bytes> {
    let reader = store.get(object).await?;
    let mut decrypt = DecryptReader::new(cipher.clone(), block_size, reader);
    let mut chunk = BytesMut::new();
    while let Some(block) = decrypt.next_block().await? {
        chunk.extend_from_slice(&block);
    }
    Ok(chunk.freeze())
}

/// Take chunk i from worker i mod N and forward it to the response stream;
/// stop on the first failure or when the client goes away, which tears the
/// workers down through their closed slots.
async fn reassemble(
    mut slots: Vec<mpsc::Receiver<Result<Bytes>>>,
    chunk_count: usize,
    body: mpsc::Sender<io::Result<Bytes>>,
) {
    let slot_count = slots.len();
    for i in 0..chunk_count {
        let slot = &mut slots[i % slot_count];
        match slot.recv().await {
            Some(Ok(chunk)) => {
                if body.send(Ok(chunk)).await.is_err() {
                    debug!("client went away mid-download");
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(chunk = i, error = %e, "chunk fetch failed");
                let _ = body.send(Err(io::Error::other(e))).await;
                return;
            }
            None => {
                let _ = body
                    .send(Err(io::Error::other("chunk fetch worker exited early")))
                    .await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{upload_chunked, upload_plain};
    use shroud_crypto::{EncryptionKey, BLOCK_OVERHEAD, FILE_ID_SIZE};
    use std::io::Cursor;

    fn test_cipher() -> Arc<BlockCipher> {
        Arc::new(BlockCipher::new(&EncryptionKey::from_bytes([5u8; 32])))
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

    async fn drain(mut stream: PlaintextStream) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(item) = stream.recv().await {
            out.extend_from_slice(&item?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn plain_roundtrip() {
        let store = memory_store();
        let cipher = test_cipher();
        let data = b"Hello, world!".to_vec();

        upload_plain(&store, &cipher, "hello.txt", 16384, Cursor::new(data.clone()))
            .await
            .unwrap();

        let names = store.list("").await.unwrap();
        assert_eq!(names, vec!["hello.txt".to_string()]);

        let stream = download_plain(&store, &cipher, "hello.txt", 16384)
            .await
            .unwrap();
        assert_eq!(drain(stream).await.unwrap(), data);
    }

    #[tokio::test]
    async fn plain_missing_object_is_not_found() {
        let store = memory_store();
        let err = download_plain(&store, &test_cipher(), "nope", 16384)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn chunked_download_preserves_order_across_workers() {
        let store = memory_store();
        let cipher = test_cipher();
        let block_size = 16usize;
        // One block per chunk; 512 bytes make 32 data chunks (spanning
        // two-digit indices, where listing order diverges from chunk order)
        // plus the boundary trailer.
        let budget = (FILE_ID_SIZE + block_size + BLOCK_OVERHEAD) as u64;
        let data = random_bytes(512);

        let outcome = upload_chunked(
            &store,
            &cipher,
            "big",
            budget,
            block_size,
            Cursor::new(data.clone()),
        )
        .await
        .unwrap();
        assert_eq!(outcome.chunks, 33);

        let stream = download_chunked(&store, &cipher, "big", block_size, 8)
            .await
            .unwrap();
        assert_eq!(drain(stream).await.unwrap(), data);
    }

    #[tokio::test]
    async fn chunked_roundtrip_with_more_workers_than_chunks() {
        let store = memory_store();
        let cipher = test_cipher();
        let data = random_bytes(100_000);

        upload_chunked(&store, &cipher, "f", 50_000, 16384, Cursor::new(data.clone()))
            .await
            .unwrap();

        let stream = download_chunked(&store, &cipher, "f", 16384, 8).await.unwrap();
        assert_eq!(drain(stream).await.unwrap(), data);
    }

    #[tokio::test]
    async fn chunked_missing_prefix_is_not_found() {
        let store = memory_store();
        let err = download_chunked(&store, &test_cipher(), "nope", 16384, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn tampered_chunk_fails_mid_stream() {
        let store = memory_store();
        let cipher = test_cipher();
        let block_size = 64usize;
        let budget = (FILE_ID_SIZE + block_size + BLOCK_OVERHEAD) as u64;
        let data = random_bytes(6 * block_size);

        upload_chunked(&store, &cipher, "f", budget, block_size, Cursor::new(data))
            .await
            .unwrap();

        let mut chunk2 = store.operator().read("f_chunk2").await.unwrap().to_vec();
        chunk2[FILE_ID_SIZE + 20] ^= 0xFF;
        store.operator().write("f_chunk2", chunk2).await.unwrap();

        let mut stream = download_chunked(&store, &cipher, "f", block_size, 4)
            .await
            .unwrap();

        let mut received = 0usize;
        let mut failed = false;
        while let Some(item) = stream.recv().await {
            match item {
                Ok(bytes) => received += bytes.len(),
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }
        assert!(failed, "tampering must surface as a stream error");
        assert_eq!(received, 2 * block_size, "chunks 0 and 1 stream before the failure");
    }

    #[tokio::test]
    async fn worker_assignment_covers_every_chunk_exactly_once() {
        let store = memory_store();
        let cipher = test_cipher();
        let block_size = 8usize;
        let budget = (FILE_ID_SIZE + block_size + BLOCK_OVERHEAD) as u64;
        // 7 chunks over 3 workers: 3 + 2 + 2
        let data = random_bytes(7 * block_size - 3);

        upload_chunked(&store, &cipher, "f", budget, block_size, Cursor::new(data.clone()))
            .await
            .unwrap();

        let stream = download_chunked(&store, &cipher, "f", block_size, 3).await.unwrap();
        assert_eq!(drain(stream).await.unwrap(), data);
    }
}
