//! Storage location commands.

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use super::print_json;
use crate::client::Client;

/// Storage locations.
#[derive(Subcommand, Debug)]
pub enum InventoryCommand {
    /// List storage locations
    Locations,

    /// Show a location with its current contents
    Get {
        /// Location id
        id: String,
    },

    /// Register a storage location (admin only)
    Add {
        /// Display name, e.g. "Warehouse A"
        #[arg(long)]
        name: String,
        /// Kind: warehouse, evidence_room, temporary_storage, secure_vault
        #[arg(long)]
        kind: String,
        /// Rated capacity
        #[arg(long)]
        capacity: u32,
        /// Responsible manager's username
        #[arg(long)]
        manager: String,
        /// Street address
        #[arg(long)]
        address: Option<String>,
    },
}

/// Runs an inventory subcommand.
pub fn run(client: &Client, command: InventoryCommand) -> Result<()> {
    let response = match command {
        InventoryCommand::Locations => client.get("/inventory/locations")?,
        InventoryCommand::Get { id } => client.get(&format!("/inventory/locations/{id}"))?,
        InventoryCommand::Add {
            name,
            kind,
            capacity,
            manager,
            address,
        } => client.post(
            "/inventory/locations",
            Some(json!({
                "name": name,
                "kind": kind,
                "capacity": capacity,
                "manager": manager,
                "address": address,
            })),
        )?,
    };
    print_json(&response)
}
