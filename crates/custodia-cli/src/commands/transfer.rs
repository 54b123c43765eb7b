//! Transfer commands.

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use super::print_json;
use crate::client::Client;

/// Transfer requests and decisions.
#[derive(Subcommand, Debug)]
pub enum TransferCommand {
    /// List transfer requests
    List,

    /// Show one request
    Get {
        /// Request id
        id: String,
    },

    /// Request a transfer
    Request {
        /// Item code to move
        #[arg(long)]
        item: String,
        /// Destination location id
        #[arg(long)]
        to: String,
        /// Why the transfer is needed
        #[arg(long)]
        reason: String,
        /// Expedited handling
        #[arg(long)]
        urgent: bool,
    },

    /// Approve a pending request
    Approve {
        /// Request id
        id: String,
        /// Decision notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Reject a pending request
    Reject {
        /// Request id
        id: String,
        /// Decision notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Receive an approved transfer at its destination
    Receive {
        /// Request id
        id: String,
    },
}

/// Runs a transfer subcommand.
pub fn run(client: &Client, command: TransferCommand) -> Result<()> {
    let response = match command {
        TransferCommand::List => client.get("/transfers")?,
        TransferCommand::Get { id } => client.get(&format!("/transfers/{id}"))?,
        TransferCommand::Request {
            item,
            to,
            reason,
            urgent,
        } => client.post(
            "/transfers",
            Some(json!({
                "item_code": item,
                "to_location": to,
                "reason": reason,
                "urgency": if urgent { "urgent" } else { "normal" },
            })),
        )?,
        TransferCommand::Approve { id, notes } => client.post(
            &format!("/transfers/{id}/approve"),
            Some(json!({ "notes": notes })),
        )?,
        TransferCommand::Reject { id, notes } => client.post(
            &format!("/transfers/{id}/reject"),
            Some(json!({ "notes": notes })),
        )?,
        TransferCommand::Receive { id } => {
            client.post(&format!("/transfers/{id}/receive"), None)?
        },
    };
    print_json(&response)
}
