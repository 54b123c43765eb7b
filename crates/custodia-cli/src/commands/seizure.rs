//! Seizure commands.

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use super::print_json;
use crate::client::Client;

/// Seizure registration and lookup.
#[derive(Subcommand, Debug)]
pub enum SeizureCommand {
    /// List registered items
    List,

    /// Show one item
    Get {
        /// Item code, e.g. CNB-2024-001
        code: String,
    },

    /// Register a new seizure
    Register {
        /// Broad type, e.g. "Drugs"
        #[arg(long)]
        kind: String,
        /// Category within the type, e.g. "Cocaine"
        #[arg(long)]
        category: String,
        /// Seized quantity
        #[arg(long)]
        quantity: f64,
        /// Unit for the quantity, e.g. "kg"
        #[arg(long)]
        unit: String,
        /// Explicit item code (generated when omitted)
        #[arg(long)]
        code: Option<String>,
        /// Where the seizure happened
        #[arg(long)]
        site: Option<String>,
        /// Case file reference
        #[arg(long)]
        case: Option<String>,
        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
    },
}

/// Runs a seizure subcommand.
pub fn run(client: &Client, command: SeizureCommand) -> Result<()> {
    let response = match command {
        SeizureCommand::List => client.get("/seizures")?,
        SeizureCommand::Get { code } => client.get(&format!("/seizures/{code}"))?,
        SeizureCommand::Register {
            kind,
            category,
            quantity,
            unit,
            code,
            site,
            case,
            notes,
        } => client.post(
            "/seizures",
            Some(json!({
                "code": code,
                "kind": kind,
                "category": category,
                "quantity": quantity,
                "unit": unit,
                "seizure_site": site,
                "case_number": case,
                "notes": notes,
            })),
        )?,
    };
    print_json(&response)
}
