//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Text and JSON rendering of unit reports

pub mod exit_codes;
pub mod output;

pub use exit_codes::{exit_code_description, from_anyhow, print_exit_codes, CliResult, ExitCodes};
pub use output::{format_errors, format_ports, format_units, OutputFormat};
