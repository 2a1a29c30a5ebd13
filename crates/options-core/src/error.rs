use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All errors produced by the options monitor.
///
/// The pure computation path (normalizer, resolver, aggregator) never returns
/// one of these; only fetching content and loading configuration can fail.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The content source reported a failure.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The content source did not answer within the configured timeout.
    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the options crates.
pub type Result<T> = std::result::Result<T, MonitorError>;
