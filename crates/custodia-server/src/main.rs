//! custodia-server - chain-of-custody workflow service.
//!
//! Loads `custodia.toml`, opens the SQLite store, wires the workflow
//! components, and serves the HTTP API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use custodia_core::identity::{NewUser, Role};
use custodia_core::{Config, Store};
use custodia_server::{build_router, AppState};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// custodia-server - chain-of-custody workflow service
#[derive(Parser, Debug)]
#[command(name = "custodia-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "custodia.toml")]
    config: PathBuf,

    /// Override the listen address from the config
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        tracing::info!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }
    Ok(config)
}

/// Creates the initial admin account on a fresh database, when configured.
fn bootstrap_admin(state: &AppState, config: &Config) -> Result<()> {
    let Some(password) = &config.auth.bootstrap_admin_password else {
        return Ok(());
    };
    if state.registry.get_by_username("admin").is_ok() {
        return Ok(());
    }
    state
        .registry
        .create_user(&NewUser {
            username: "admin".to_string(),
            display_name: "Administrator".to_string(),
            role: Role::Admin,
            station: None,
            password: password.clone(),
            mfa_enabled: true,
        })
        .context("failed to bootstrap admin account")?;
    tracing::warn!("bootstrap admin account created; rotate its password");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli)?;
    let store = Arc::new(
        Store::open(&config.server.db_path)
            .with_context(|| format!("failed to open {}", config.server.db_path.display()))?,
    );
    let state = AppState::new(store, &config);
    bootstrap_admin(&state, &config)?;

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;
    tracing::info!(
        addr = %config.server.listen_addr,
        db = %config.server.db_path.display(),
        "custodia-server listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
