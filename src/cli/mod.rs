//! Command-line interface for report-forge.
//!
//! Provides commands to generate, stream and export reports.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
