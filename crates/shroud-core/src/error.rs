use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Request- and startup-level errors of the gateway.
///
/// Per-request failures never terminate the process; only configuration and
/// cipher construction errors at startup are fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed chunk-size string or unparseable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Authenticated decryption failed: tampered data, transplanted block,
    /// or truncated sealed block.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// No stored object (or no chunk) matches the requested name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Failure talking to the object store.
    #[error("storage error: {0}")]
    Storage(String),

    /// The HTTP peer went away mid-transfer.
    #[error("client aborted")]
    ClientAborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<opendal::Error> for Error {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            _ => Error::Storage(err.to_string()),
        }
    }
}
