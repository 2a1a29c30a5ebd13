//! Where raw trade-log content comes from.

use std::future::Future;
use std::path::{Path, PathBuf};

use options_core::error::{MonitorError, Result};

// ── ContentSource ─────────────────────────────────────────────────────────────

/// Produces the current raw content of the trade log.
///
/// Called at most once at a time by the refresh controller; a slow fetch
/// simply delays the next refresh.
pub trait ContentSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<String>> + Send;

    /// Short human-readable description for log lines.
    fn describe(&self) -> String;
}

// ── FileSource ────────────────────────────────────────────────────────────────

/// Reads the whole trade log from a local file on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for FileSource {
    fn fetch(&self) -> impl Future<Output = Result<String>> + Send {
        let path = self.path.clone();
        async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => Ok(content),
                Err(source) => Err(MonitorError::FileRead { path, source }),
            }
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
