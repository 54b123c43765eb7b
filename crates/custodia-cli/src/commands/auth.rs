//! Login command.

use anyhow::Result;
use serde_json::json;

use crate::client::Client;

/// Logs in and prints the token with an export hint.
pub fn login(client: &Client, username: &str, password: &str) -> Result<()> {
    let response = client.post(
        "/auth/login",
        Some(json!({ "username": username, "password": password })),
    )?;
    let token = response["token"].as_str().unwrap_or_default();
    println!("export CUSTODIA_TOKEN={token}");
    eprintln!(
        "logged in as {} ({})",
        response["display_name"].as_str().unwrap_or(username),
        response["role"].as_str().unwrap_or("unknown role"),
    );
    Ok(())
}
