//! Upload orchestration: one object per file, or a rolling series of
//! budget-bounded chunk objects.

use std::sync::Arc;

use tokio::io::AsyncRead;

use shroud_core::{Error, Result};
use shroud_crypto::{chunk_name, min_chunk_budget, BlockCipher, FileId};
use shroud_storage::ObjectStore;

use crate::pipeline::encrypt_to_object;

/// Outcome of a chunked upload: the store's tag for every chunk, in order,
/// and the true chunk count.
#[derive(Debug)]
pub struct ChunkedUpload {
    pub tags: Vec<String>,
    pub chunks: u64,
}

/// Encrypt the whole source into a single object named after the file.
pub async fn upload_plain<R>(
    store: &ObjectStore,
    cipher: &Arc<BlockCipher>,
    filename: &str,
    block_size: usize,
    source: R,
) -> Result<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let file_id = FileId::generate();
    let (etag, _, _) =
        encrypt_to_object(store, cipher, filename, file_id, source, None, block_size).await?;
    tracing::debug!(filename, "uploaded single object");
    Ok(etag)
}

/// Encrypt the source into `<filename>_chunk0`, `<filename>_chunk1`, …,
/// each at most `budget` on-wire bytes.
///
/// Chunks are uploaded serially; each runs its own producer/consumer
/// pipeline. The file id is generated once and threaded into every chunk,
/// so all chunks of one upload authenticate against the same identifier.
pub async fn upload_chunked<R>(
    store: &ObjectStore,
    cipher: &Arc<BlockCipher>,
    filename: &str,
    budget: u64,
    block_size: usize,
    mut source: R,
) -> Result<ChunkedUpload>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let min = min_chunk_budget(block_size);
    if budget < min {
        return Err(Error::Config(format!(
            "chunk size {budget} is below the minimum of {min} bytes \
             (file id header + one sealed block)"
        )));
    }

    let file_id = FileId::generate();
    let mut tags = Vec::new();
    let mut index = 0u64;

    loop {
        let object = chunk_name(filename, index);
        let (etag, rest, eof) = encrypt_to_object(
            store,
            cipher,
            &object,
            file_id,
            source,
            Some(budget),
            block_size,
        )
        .await?;
        source = rest;
        tags.push(etag);
        index += 1;

        if eof {
            break;
        }
    }

    tracing::debug!(filename, chunks = index, "uploaded chunked object set");
    Ok(ChunkedUpload {
        tags,
        chunks: index,
    })
}
