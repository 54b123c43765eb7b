//! Destruction commands.

use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::json;

use super::print_json;
use crate::client::Client;

/// Destruction requests, approvals, execution.
#[derive(Subcommand, Debug)]
pub enum DestructionCommand {
    /// List destruction requests
    List,

    /// Show one request
    Get {
        /// Request id
        id: String,
    },

    /// Create a draft destruction request
    Create {
        /// Item codes, repeatable
        #[arg(long = "item", required = true)]
        items: Vec<String>,
        /// Method: incineration, chemical_neutralization, crushing, burial, other
        #[arg(long)]
        method: String,
        /// Legal justification
        #[arg(long)]
        reason: String,
        /// Planned execution date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Witness as "Name:role", repeatable
        #[arg(long = "witness")]
        witnesses: Vec<String>,
    },

    /// Submit a draft for approval
    Submit {
        /// Request id
        id: String,
    },

    /// Approve one level
    Approve {
        /// Request id
        id: String,
        /// Approval level
        #[arg(long)]
        level: u32,
        /// Decision notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reject the request at one level
    Reject {
        /// Request id
        id: String,
        /// Approval level
        #[arg(long)]
        level: u32,
        /// Decision notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Execute a fully approved request
    Execute {
        /// Request id
        id: String,
    },
}

fn parse_witness(raw: &str) -> Result<serde_json::Value> {
    let Some((name, role)) = raw.split_once(':') else {
        bail!("witness must be \"Name:role\", got {raw:?}");
    };
    Ok(json!({ "name": name.trim(), "role": role.trim() }))
}

/// Runs a destruction subcommand.
pub fn run(client: &Client, command: DestructionCommand) -> Result<()> {
    let response = match command {
        DestructionCommand::List => client.get("/destruction-requests")?,
        DestructionCommand::Get { id } => client.get(&format!("/destruction-requests/{id}"))?,
        DestructionCommand::Create {
            items,
            method,
            reason,
            date,
            witnesses,
        } => {
            let witnesses = witnesses
                .iter()
                .map(|w| parse_witness(w))
                .collect::<Result<Vec<_>>>()?;
            client.post(
                "/destruction-requests",
                Some(json!({
                    "item_codes": items,
                    "method": method,
                    "legal_reason": reason,
                    "scheduled_date": date,
                    "witnesses": witnesses,
                })),
            )?
        },
        DestructionCommand::Submit { id } => {
            client.post(&format!("/destruction-requests/{id}/submit"), None)?
        },
        DestructionCommand::Approve { id, level, notes } => client.post(
            &format!("/destruction-requests/{id}/approve"),
            Some(json!({ "level": level, "notes": notes })),
        )?,
        DestructionCommand::Reject { id, level, notes } => client.post(
            &format!("/destruction-requests/{id}/reject"),
            Some(json!({ "level": level, "notes": notes })),
        )?,
        DestructionCommand::Execute { id } => {
            client.post(&format!("/destruction-requests/{id}/execute"), None)?
        },
    };
    print_json(&response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn witness_parsing() {
        let witness = parse_witness("Legal Advisor Hanna: legal").expect("parse");
        assert_eq!(witness["name"], "Legal Advisor Hanna");
        assert_eq!(witness["role"], "legal");

        assert!(parse_witness("no-role").is_err());
    }
}
