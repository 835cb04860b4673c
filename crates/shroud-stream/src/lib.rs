//! shroud-stream: the encrypt/decrypt streaming core of the gateway
//!
//! Upload path: HTTP body → seal blocks → bounded pipe → object store put.
//! Download path: object store get → open blocks → bounded pipe → HTTP body.
//!
//! Pipes are bounded `tokio::sync::mpsc` channels of `Bytes`; dropping the
//! sender is end-of-stream for the receiver. Producer and consumer run as
//! separate tasks so network ingress, crypto, and store egress stay in
//! flight concurrently with constant memory, whatever the file size.

pub mod download;
pub mod pipeline;
pub mod upload;

pub use download::{download_chunked, download_plain};
pub use pipeline::DecryptReader;
pub use upload::{upload_chunked, upload_plain, ChunkedUpload};

/// Depth of the bounded pipe between pipeline stages, in blocks.
pub(crate) const PIPE_DEPTH: usize = 8;
