//! Sidecar observability listener
//!
//! The scrape path never shares a port with the data path: a second,
//! loopback-bound server carries `/metrics` (Prometheus text exposition),
//! `/healthz` (process liveness) and `/readyz` (the bucket answered a
//! probe). Counters live in [`GatewayMetrics`] and are bumped by the
//! upload/download handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus_client::{encoding::text::encode, metrics::counter::Counter};
use tracing::{error, info};

use shroud_storage::ObjectStore;

pub use prometheus_client::registry::Registry;

/// Request counters shared with the gateway handlers.
#[derive(Clone)]
pub struct GatewayMetrics {
    pub uploads: Counter,
    pub downloads: Counter,
    pub request_errors: Counter,
}

impl GatewayMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let uploads = Counter::default();
        let downloads = Counter::default();
        let request_errors = Counter::default();

        registry.register(
            "shroud_uploads_total",
            "Completed file uploads",
            uploads.clone(),
        );
        registry.register(
            "shroud_downloads_total",
            "Started file downloads",
            downloads.clone(),
        );
        registry.register(
            "shroud_request_errors_total",
            "Requests that failed before streaming completed",
            request_errors.clone(),
        );

        GatewayMetrics {
            uploads,
            downloads,
            request_errors,
        }
    }
}

/// State behind the observability routes.
#[derive(Clone)]
pub struct ObsState {
    pub registry: Arc<Registry>,
    pub store: ObjectStore,
}

/// Run the observability listener until the process exits.
pub async fn serve(addr: String, state: ObsState) -> Result<()> {
    let routes = Router::new()
        .route("/metrics", get(render_registry))
        .route("/healthz", get(|| async { (StatusCode::OK, "alive") }))
        .route("/readyz", get(readiness))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("observability listener on {addr}"))?;
    info!(%addr, "observability endpoints up");

    axum::serve(listener, routes)
        .await
        .context("observability server exited")
}

async fn render_registry(State(state): State<ObsState>) -> Response {
    let mut exposition = String::new();
    if let Err(e) = encode(&mut exposition, &state.registry) {
        error!(error = %e, "metrics registry did not encode");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        exposition,
    )
        .into_response()
}

/// Ready once the bucket answers; 503 keeps the pod out of rotation until
/// the store comes back.
async fn readiness(State(state): State<ObsState>) -> (StatusCode, &'static str) {
    match state.store.probe().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "bucket unreachable"),
    }
}
