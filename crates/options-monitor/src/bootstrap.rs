use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a CLI log-level name to an [`EnvFilter`] directive.
///
/// Unknown names are passed through so that full directives such as
/// `options_runtime=trace` still work.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr, or is appended to `log_file` when one is given
/// (its parent directory is created if needed). Falls back to `"info"` if the
/// level string is not a valid filter.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => {
            let layer = fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            (Some(layer), None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

fn open_log_file(path: &Path) -> anyhow::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
