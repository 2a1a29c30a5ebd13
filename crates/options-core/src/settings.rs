use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::models::ColumnRole;

/// Default polling interval in seconds.
pub const DEFAULT_REFRESH_SECS: u64 = 10;

// ── HeaderSpellings ────────────────────────────────────────────────────────────

/// Accepted header spellings per [`ColumnRole`].
///
/// Matching is done after trimming and upper-casing both sides, so the
/// spellings themselves need not be canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSpellings {
    pub margin: Vec<String>,
    pub pnl: Vec<String>,
    pub instrument_type: Vec<String>,
}

impl Default for HeaderSpellings {
    fn default() -> Self {
        Self {
            margin: vec!["MARGIN".to_string()],
            pnl: vec!["PNL_BUYPRICE_CLOSEPRICE".to_string()],
            instrument_type: vec!["OPTIONTYPE".to_string(), "OPTION TYPE".to_string()],
        }
    }
}

impl HeaderSpellings {
    pub fn spellings(&self, role: ColumnRole) -> &[String] {
        match role {
            ColumnRole::Margin => &self.margin,
            ColumnRole::Pnl => &self.pnl,
            ColumnRole::InstrumentType => &self.instrument_type,
        }
    }

    /// Accept one more spelling for `role`; duplicates are ignored.
    pub fn add(&mut self, role: ColumnRole, spelling: impl Into<String>) {
        let spelling = spelling.into();
        let list = match role {
            ColumnRole::Margin => &mut self.margin,
            ColumnRole::Pnl => &mut self.pnl,
            ColumnRole::InstrumentType => &mut self.instrument_type,
        };
        if !list.contains(&spelling) {
            list.push(spelling);
        }
    }
}

// ── EngineConfig ───────────────────────────────────────────────────────────────

/// File-backed configuration for the refresh engine.
///
/// Stored as JSON, by default at `~/.options-monitor/config.json`. Every key
/// is optional; absent keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between polls.
    pub refresh_interval_secs: u64,
    /// Upper bound on a single fetch; `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
    /// Fetch attempts per tick before the tick is reported as failed.
    pub fetch_attempts: u32,
    pub header_spellings: HeaderSpellings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            fetch_timeout_secs: None,
            fetch_attempts: 1,
            header_spellings: HeaderSpellings::default(),
        }
    }
}

impl EngineConfig {
    /// Return the default path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".options-monitor").join("config.json")
    }

    /// Load and validate the config at `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| MonitorError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`EngineConfig::load_from`], falling back to defaults when the
    /// file is absent or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no engine config; using defaults");
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring engine config");
                Self::default()
            }
        }
    }

    /// Write the config as pretty JSON, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(MonitorError::Config(
                "refresh_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.fetch_attempts == 0 {
            return Err(MonitorError::Config(
                "fetch_attempts must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == Some(0) {
            return Err(MonitorError::Config(
                "fetch_timeout_secs must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Live P&L summary for an options trade log
#[derive(Parser, Debug, Clone)]
#[command(
    name = "options-monitor",
    about = "Live P&L summary for an options trade log",
    version
)]
pub struct Settings {
    /// Trade log (comma-separated) to watch
    #[arg(long)]
    pub file: PathBuf,

    /// Engine config file (defaults to ~/.options-monitor/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Refresh rate in seconds; overrides the config file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub refresh_rate: Option<u64>,

    /// Compute the summary once, print it as JSON and exit
    #[arg(long)]
    pub once: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Effective log level after applying `--debug`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Load the engine config and apply CLI overrides on top of it.
    ///
    /// An explicit `--config` that cannot be loaded is an error; the implicit
    /// default path silently falls back to defaults.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load_from(path)?,
            None => EngineConfig::load_or_default(&EngineConfig::config_path()),
        };
        if let Some(secs) = self.refresh_rate {
            config.refresh_interval_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
