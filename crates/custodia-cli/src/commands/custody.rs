//! Custody chain and audit commands.

use anyhow::Result;
use clap::Subcommand;

use super::print_json;
use crate::client::Client;

/// Custody chain inspection and audit queries.
#[derive(Subcommand, Debug)]
pub enum CustodyCommand {
    /// Show an item's custody events in sequence order
    Events {
        /// Item code
        code: String,
    },

    /// Recompute and report an item's chain integrity
    Verify {
        /// Item code
        code: String,
    },

    /// Query the global audit log (requires audit capability)
    Audit {
        /// Only events for this item
        #[arg(long)]
        item: Option<String>,
        /// Only events by this actor
        #[arg(long)]
        actor: Option<String>,
        /// Maximum number of events
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
}

/// Runs a custody subcommand.
pub fn run(client: &Client, command: CustodyCommand) -> Result<()> {
    let response = match command {
        CustodyCommand::Events { code } => client.get(&format!("/items/{code}/custody-events"))?,
        CustodyCommand::Verify { code } => client.get(&format!("/items/{code}/custody-verify"))?,
        CustodyCommand::Audit { item, actor, limit } => {
            let mut query = format!("/audit/events?limit={limit}");
            if let Some(item) = item {
                query.push_str(&format!("&item_code={item}"));
            }
            if let Some(actor) = actor {
                query.push_str(&format!("&actor={actor}"));
            }
            client.get(&query)?
        },
    };
    print_json(&response)
}
