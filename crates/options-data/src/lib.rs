//! Tabular aggregation engine for options trade logs.
//!
//! Parses comma-separated trade exports, locates the margin / PnL /
//! instrument-type columns however the header spells them, and folds the
//! data rows into summary metrics.

pub mod aggregator;
pub mod analysis;
pub mod columns;
pub mod reader;

pub use options_core as core;
