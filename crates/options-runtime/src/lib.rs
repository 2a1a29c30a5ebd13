//! Runtime layer for the options monitor.
//!
//! Owns the change-gated refresh controller and the interval loop that
//! drives it.

pub mod controller;
pub mod orchestrator;
pub mod source;

pub use options_core as core;
pub use options_data as data;
