use secrecy::SecretString;
use serde::Deserialize;

/// Top-level gateway configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen: String,
    /// Prometheus metrics + health endpoint (optional)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Object store host:port (scheme is derived from `use_ssl`)
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Target bucket name
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    /// Whether to use TLS toward the object store
    pub use_ssl: bool,
}

/// Block encryption configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// 64 hex characters, decoded to the 32-byte symmetric key at startup.
    /// Empty or malformed values are fatal.
    pub encryption_key: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Whether to split uploads into chunk objects
    pub enabled: bool,
    /// Plaintext block size in bytes. The download side frames stored
    /// objects with this same value; changing it orphans existing data.
    pub block_size: usize,
    /// Parallel chunk fetch tasks per download
    pub download_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            metrics_addr: Some("127.0.0.1:9100".into()),
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "shroud".into(),
            access_key_id: String::new(),
            secret_access_key: SecretString::new(String::new()),
            use_ssl: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            encryption_key: SecretString::new(String::new()),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            block_size: 16384,
            download_workers: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:9090"
log_level = "debug"
log_format = "json"

[storage]
endpoint = "minio.internal:9000"
region = "eu-west-1"
bucket = "uploads"
access_key_id = "AKIA_TEST"
secret_access_key = "sekrit"
use_ssl = true

[crypto]
encryption_key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"

[chunking]
enabled = true
block_size = 8192
download_workers = 4
"#;
        let config: GatewayConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:9090");
        assert_eq!(config.server.log_format, "json");
        assert_eq!(config.storage.endpoint, "minio.internal:9000");
        assert_eq!(config.storage.bucket, "uploads");
        assert!(config.storage.use_ssl);
        assert_eq!(config.storage.secret_access_key.expose_secret(), "sekrit");
        assert_eq!(config.crypto.encryption_key.expose_secret().len(), 64);
        assert!(config.chunking.enabled);
        assert_eq!(config.chunking.block_size, 8192);
        assert_eq!(config.chunking.download_workers, 4);
    }

    #[test]
    fn parse_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.endpoint, "localhost:9000");
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.bucket, "shroud");
        assert!(!config.storage.use_ssl);
        assert!(!config.chunking.enabled);
        assert_eq!(config.chunking.block_size, 16384);
        assert_eq!(config.chunking.download_workers, 8);
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[chunking]
enabled = true
"#;
        let config: GatewayConfig = toml::from_str(toml_str).unwrap();

        assert!(config.chunking.enabled);
        // Defaults fill the rest
        assert_eq!(config.chunking.block_size, 16384);
        assert_eq!(config.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let toml_str = r#"
[storage]
secret_access_key = "topsecret"
"#;
        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("topsecret"));
    }
}
