//! HTTP edge: router, shared request state, error-to-status mapping

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use shroud_core::config::ChunkingConfig;
use shroud_crypto::BlockCipher;
use shroud_storage::ObjectStore;

use crate::metrics::GatewayMetrics;

/// Per-process state shared by every request. The cipher and store are
/// immutable after construction; nothing request-scoped lives here.
#[derive(Clone)]
pub struct AppState {
    pub store: ObjectStore,
    pub cipher: Arc<BlockCipher>,
    pub chunking: ChunkingConfig,
    pub metrics: GatewayMetrics,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload/file", post(crate::upload::upload_file))
        .route("/file/{name}", get(crate::download::serve_file))
        // Uploads are streamed straight into the pipeline, never buffered
        // whole, so the default 2 MB cap does not apply.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding {addr}: {e}"))?;
    info!(addr = %addr, "gateway: listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("gateway server: {e}"))
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// Request-scoped failure carrying the HTTP status it maps to. Errors here
/// never terminate the process.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<shroud_core::Error> for ApiError {
    fn from(err: shroud_core::Error) -> Self {
        let status = match &err {
            shroud_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}
