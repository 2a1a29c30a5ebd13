mod bootstrap;

use anyhow::{bail, Result};
use clap::Parser;
use options_core::settings::Settings;
use options_data::reader::CsvTableParser;
use options_runtime::controller::{RefreshController, RefreshSnapshot, TickOutcome};
use options_runtime::orchestrator::RefreshOrchestrator;
use options_runtime::source::FileSource;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level(), settings.log_file.as_deref())?;

    tracing::info!("Options Monitor v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings.engine_config()?;
    tracing::info!(
        "Watching {} every {}s",
        settings.file.display(),
        config.refresh_interval_secs
    );

    let controller = RefreshController::new(
        FileSource::new(&settings.file),
        CsvTableParser::new(),
        &config,
    );

    if settings.once {
        match controller.tick().await {
            TickOutcome::Failed(message) => bail!(message),
            outcome => tracing::debug!(?outcome, "single refresh finished"),
        }
        println!("{}", serde_json::to_string_pretty(&summary(&controller.snapshot()))?);
        return Ok(());
    }

    let handle = RefreshOrchestrator::new(controller, config.refresh_interval()).start();
    let mut rx = handle.subscribe();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&summary(&snapshot))?);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping refresh loop");
                break;
            }
        }
    }

    handle.stop();
    Ok(())
}

/// JSON view of a snapshot for stdout.
fn summary(snapshot: &RefreshSnapshot) -> serde_json::Value {
    json!({
        "revision": snapshot.revision,
        "refreshed_at": snapshot.refreshed_at,
        "missing_columns": snapshot.analysis.missing_columns(),
        "metrics": snapshot.metrics(),
    })
}
