//! custodia - operator CLI for the chain-of-custody workflow service.
//!
//! Authenticate once with `custodia login`, export the printed token as
//! `CUSTODIA_TOKEN`, then drive seizures, transfers, destruction requests,
//! and custody-chain checks against a running custodia-server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

use client::Client;

/// custodia - contraband chain-of-custody operations
#[derive(Parser, Debug)]
#[command(name = "custodia")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:8420", env = "CUSTODIA_URL")]
    url: String,

    /// Session token from `custodia login`
    #[arg(long, env = "CUSTODIA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and print a session token
    Login {
        /// Username
        username: String,
        /// Password
        #[arg(long, env = "CUSTODIA_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Seizure registration and lookup
    #[command(subcommand)]
    Seizure(commands::seizure::SeizureCommand),

    /// Transfer requests and decisions
    #[command(subcommand)]
    Transfer(commands::transfer::TransferCommand),

    /// Destruction requests, approvals, execution
    #[command(subcommand)]
    Destruction(commands::destruction::DestructionCommand),

    /// Custody chain inspection and audit queries
    #[command(subcommand)]
    Custody(commands::custody::CustodyCommand),

    /// Storage locations
    #[command(subcommand)]
    Inventory(commands::inventory::InventoryCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::new(cli.log_level.clone()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = Client::new(&cli.url, cli.token.clone());
    match cli.command {
        Commands::Login { username, password } => commands::auth::login(&client, &username, &password),
        Commands::Seizure(command) => commands::seizure::run(&client, command),
        Commands::Transfer(command) => commands::transfer::run(&client, command),
        Commands::Destruction(command) => commands::destruction::run(&client, command),
        Commands::Custody(command) => commands::custody::run(&client, command),
        Commands::Inventory(command) => commands::inventory::run(&client, command),
    }
}
