//! Thin wrapper over the OpenDAL operator exposing exactly the capabilities
//! the streaming core consumes: put-object, get-object, list-by-prefix.

use bytes::Bytes;
use opendal::Operator;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

use shroud_core::{Error, Result};

/// Readable byte stream of one stored object.
pub type ObjectReader = Compat<opendal::FuturesAsyncReader>;

/// Streaming writer for one object. Closing it completes the put and
/// yields the store's upload tag.
pub struct ObjectWriter {
    inner: opendal::Writer,
}

impl ObjectWriter {
    pub async fn write(&mut self, bytes: Bytes) -> Result<()> {
        self.inner.write(bytes).await?;
        Ok(())
    }

    /// Finish the upload. Returns the ETag, or an empty string for backends
    /// that do not report one.
    pub async fn close(mut self) -> Result<String> {
        let meta = self.inner.close().await?;
        Ok(meta.etag().unwrap_or_default().to_string())
    }
}

/// Object store handle shared across requests. Cloning is cheap; the
/// underlying operator is immutable after construction.
#[derive(Clone)]
pub struct ObjectStore {
    op: Operator,
}

impl ObjectStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Ask the bucket for a shallow root listing to confirm it answers.
    /// Run at startup and by the readiness endpoint; bucket provisioning
    /// is the store deployment's job, not the gateway's.
    pub async fn probe(&self) -> Result<()> {
        self.op
            .list("/")
            .await
            .map(|_| ())
            .map_err(|e| Error::Storage(format!("bucket is not answering: {e}")))
    }

    /// Start a streaming put. Bytes written become the object body; the
    /// object does not exist until `close` succeeds.
    pub async fn put(&self, name: &str) -> Result<ObjectWriter> {
        let inner = self
            .op
            .writer_with(name)
            .content_type("application/octet-stream")
            .await?;
        Ok(ObjectWriter { inner })
    }

    /// Open a streaming read of the whole object. Fails with `NotFound`
    /// when no such object exists.
    pub async fn get(&self, name: &str) -> Result<ObjectReader> {
        let meta = self.op.stat(name).await?;
        let reader = self.op.reader(name).await?;
        let futures_reader = reader
            .into_futures_async_read(0..meta.content_length())
            .await?;
        Ok(futures_reader.compat())
    }

    /// Names of every object whose name starts with `prefix`. The order is
    /// whatever the store returns; callers must not assume numeric order.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.op.list_with(prefix).recursive(true).await?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.path().ends_with('/'))
            .map(|e| e.path().to_string())
            .collect())
    }
}
