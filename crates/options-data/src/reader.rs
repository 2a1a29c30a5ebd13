//! Comma-separated trade log parsing.
//!
//! Turns raw file content into a [`RawTable`]. Parsing is best effort and
//! never fails: records the CSV reader rejects are skipped with a warning.

use csv::ReaderBuilder;
use options_core::models::{Cell, RawTable};
use tracing::{debug, warn};

// ── TableParser ───────────────────────────────────────────────────────────────

/// Converts raw text into rows × cells. Row 0 must be left in place as the
/// header row; no column interpretation happens here.
pub trait TableParser: Send + Sync {
    fn parse(&self, content: &str) -> RawTable;
}

// ── CsvTableParser ────────────────────────────────────────────────────────────

/// [`TableParser`] backed by the `csv` crate.
#[derive(Debug, Clone)]
pub struct CsvTableParser {
    delimiter: u8,
}

impl Default for CsvTableParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvTableParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different field separator (e.g. `b';'` for some locales).
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl TableParser for CsvTableParser {
    fn parse(&self, content: &str) -> RawTable {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(content.as_bytes());

        let mut rows: Vec<Vec<Cell>> = Vec::new();
        let mut skipped = 0usize;

        for (idx, record) in reader.records().enumerate() {
            match record {
                Ok(record) => rows.push(record.iter().map(parse_field).collect()),
                Err(e) => {
                    warn!(record = idx, error = %e, "skipping malformed record");
                    skipped += 1;
                }
            }
        }

        debug!(rows = rows.len(), skipped, "parsed trade log");
        RawTable::new(rows)
    }
}

/// Empty → [`Cell::Empty`], plain finite number → [`Cell::Number`], anything
/// else is kept verbatim as [`Cell::Text`].
fn parse_field(field: &str) -> Cell {
    if field.is_empty() {
        return Cell::Empty;
    }
    match field.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Cell::Number(n),
        _ => Cell::Text(field.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
