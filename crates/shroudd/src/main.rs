//! shroudd: encrypted object-storage gateway daemon
//!
//! Usage:
//!   shroudd [--config ./config.toml]
//!
//! Receives multipart uploads over HTTP, encrypts them block by block, and
//! stores the ciphertext in an S3-compatible object store; downloads are
//! fetched (in parallel for chunked files), decrypted, and streamed back.

mod download;
mod metrics;
mod server;
mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use shroud_core::config::GatewayConfig;
use shroud_crypto::{BlockCipher, EncryptionKey};
use shroud_storage::ObjectStore;

#[derive(Parser, Debug)]
#[command(name = "shroudd", version, about = "Encrypted object-storage gateway")]
struct Cli {
    /// Path to the config.toml configuration file
    #[arg(long, short = 'c', env = "SHROUD_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(long, env = "SHROUD_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides the config
    #[arg(long, env = "SHROUD_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let level = cli.log.as_deref().unwrap_or(&config.server.log_level);
    let format = match cli.log_format {
        Some(f) => f,
        None if config.server.log_format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "shroudd starting"
    );

    // Cipher construction is the only legitimately fatal part of startup
    // besides config parsing itself.
    let key = EncryptionKey::from_hex(config.crypto.encryption_key.expose_secret())
        .context("loading encryption key from config")?;
    let cipher = Arc::new(BlockCipher::new(&key));

    let operator =
        shroud_storage::build_operator(&config.storage).context("building storage operator")?;
    let store = ObjectStore::new(operator);
    match store.probe().await {
        Ok(()) => info!(
            endpoint = %config.storage.endpoint,
            bucket = %config.storage.bucket,
            "object store: connected"
        ),
        Err(e) => warn!(
            endpoint = %config.storage.endpoint,
            "object store: {e}  (requests will be retried against it)"
        ),
    }

    let gateway_metrics = if let Some(addr) = config.server.metrics_addr.clone() {
        let mut registry = metrics::Registry::default();
        let gateway_metrics = metrics::GatewayMetrics::new(&mut registry);
        let obs = metrics::ObsState {
            registry: Arc::new(registry),
            store: store.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(addr, obs).await {
                tracing::error!("observability listener failed: {e}");
            }
        });
        gateway_metrics
    } else {
        metrics::GatewayMetrics::new(&mut metrics::Registry::default())
    };

    let state = server::AppState {
        store,
        cipher,
        chunking: config.chunking.clone(),
        metrics: gateway_metrics,
    };

    server::serve(&config.server.listen, state).await
}

/// A missing file is fine (built-in defaults); an unreadable or invalid
/// one is a startup failure.
async fn load_config(path: &Path) -> Result<GatewayConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => toml::from_str(&raw)
            .with_context(|| format!("{} is not a valid gateway config", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "no config file; running on built-in defaults");
            Ok(GatewayConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("could not read {}", path.display())),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
