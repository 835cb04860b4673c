//! Streaming download handler

use axum::{
    body::Body,
    extract::{Path, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::Response,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use shroud_stream::{download_chunked, download_plain};

use crate::server::{ApiError, AppState};

/// `GET /file/{name}` — stream the reconstructed plaintext.
///
/// The 404 decision happens before the response starts; failures after the
/// first byte (a tampered block, a dropped store connection) abort the
/// transfer mid-stream.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    debug!(%name, chunked = state.chunking.enabled, "download requested");

    let stream = if state.chunking.enabled {
        download_chunked(
            &state.store,
            &state.cipher,
            &name,
            state.chunking.block_size,
            state.chunking.download_workers,
        )
        .await
    } else {
        download_plain(&state.store, &state.cipher, &name, state.chunking.block_size).await
    }
    .map_err(|e| {
        warn!(%name, error = %e, "download failed to start");
        state.metrics.request_errors.inc();
        ApiError::from(e)
    })?;

    state.metrics.downloads.inc();

    let response = Response::builder()
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )
        .body(Body::from_stream(ReceiverStream::new(stream)))
        .map_err(|e| ApiError::internal(format!("building response: {e}")))?;

    Ok(response)
}
