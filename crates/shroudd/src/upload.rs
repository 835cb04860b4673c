//! Multipart upload handler
//!
//! The file field is pumped into a bounded ingress pipe feeding the encrypt
//! pipeline, so the request body is never buffered whole. When chunking is
//! enabled the `chunk-size` field must arrive before the `upload` field —
//! the form is processed as a stream and the budget is needed up front.

use std::io;

use axum::{
    extract::{multipart::Field, Multipart, State},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use shroud_core::Error;
use shroud_crypto::parse_size;
use shroud_stream::{upload_chunked, upload_plain, ChunkedUpload};

use crate::server::{ApiError, AppState};

/// Depth of the ingress pipe between the HTTP body and the encrypt producer.
const INGRESS_DEPTH: usize = 8;

#[derive(Serialize)]
struct PlainUploadResponse {
    status: &'static str,
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Serialize)]
struct ChunkedUploadResponse {
    status: String,
    #[serde(rename = "Tags")]
    tags: Vec<String>,
    chunks: u64,
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut chunk_size_text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("chunk-size") => {
                chunk_size_text = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("unreadable chunk-size field: {e}"))
                })?);
            }
            Some("upload") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("upload field has no filename"))?;
                return store_upload(state, field, filename, chunk_size_text).await;
            }
            other => {
                debug!(field = ?other, "ignoring unknown multipart field");
            }
        }
    }

    Err(ApiError::bad_request("missing `upload` file field"))
}

async fn store_upload(
    state: AppState,
    mut field: Field<'_>,
    filename: String,
    chunk_size_text: Option<String>,
) -> Result<Response, ApiError> {
    let (ingress_tx, ingress_rx) = mpsc::channel::<io::Result<Bytes>>(INGRESS_DEPTH);
    let source = StreamReader::new(ReceiverStream::new(ingress_rx));

    let block_size = state.chunking.block_size;
    let store = state.store.clone();
    let cipher = state.cipher.clone();

    // The pipeline runs in its own task while this handler keeps pumping
    // body bytes into the ingress pipe.
    let pipeline = if state.chunking.enabled {
        let text = chunk_size_text.ok_or_else(|| {
            ApiError::from(Error::Config(
                "chunking is enabled but no chunk-size field preceded the upload".into(),
            ))
        })?;
        let budget = parse_size(&text)?;
        debug!(%filename, budget, "starting chunked upload");
        tokio::spawn(async move {
            upload_chunked(&store, &cipher, &filename, budget, block_size, source)
                .await
                .map(Outcome::Chunked)
        })
    } else {
        debug!(%filename, "starting upload");
        tokio::spawn(async move {
            upload_plain(&store, &cipher, &filename, block_size, source)
                .await
                .map(Outcome::Plain)
        })
    };

    loop {
        match field.chunk().await {
            Ok(Some(bytes)) => {
                if ingress_tx.send(Ok(bytes)).await.is_err() {
                    // Pipeline bailed out; its error surfaces below.
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = ingress_tx
                    .send(Err(io::Error::other(format!("request body failed: {e}"))))
                    .await;
                break;
            }
        }
    }
    drop(ingress_tx);

    let outcome = pipeline
        .await
        .map_err(|e| ApiError::internal(format!("upload pipeline panicked: {e}")))?
        .map_err(|e| {
            warn!(error = %e, "upload failed");
            state.metrics.request_errors.inc();
            ApiError::from(e)
        })?;

    state.metrics.uploads.inc();
    Ok(match outcome {
        Outcome::Plain(etag) => Json(PlainUploadResponse {
            status: "success",
            etag,
        })
        .into_response(),
        Outcome::Chunked(ChunkedUpload { tags, chunks }) => Json(ChunkedUploadResponse {
            status: format!("successfully uploaded {chunks} chunks"),
            tags,
            chunks,
        })
        .into_response(),
    })
}

enum Outcome {
    Plain(String),
    Chunked(ChunkedUpload),
}
