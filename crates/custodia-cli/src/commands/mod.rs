//! CLI subcommand implementations.

pub mod auth;
pub mod custody;
pub mod destruction;
pub mod inventory;
pub mod seizure;
pub mod transfer;

use anyhow::Result;
use serde_json::Value;

/// Pretty-prints a JSON response to stdout.
pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
