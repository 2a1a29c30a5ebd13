//! Core types for the options monitor.
//!
//! Holds the table/metrics data model, the cell normalizer, the error type
//! and configuration shared by the data and runtime crates.

pub mod error;
pub mod models;
pub mod normalize;
pub mod settings;

pub use error::{MonitorError, Result};
