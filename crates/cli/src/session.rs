use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tether_api_client::tether_api::LoginRequest;
use tether_api_client::tether_runtime_config::ClientConfig;
use tether_api_client::{ClientState, FileStore, SessionClient};

use crate::config::clock_dir;

/// Build a client whose clock lives in the per-user data directory, so that
/// concurrent `tether` processes coordinate their refreshes.
pub fn build_client(config: ClientConfig) -> Result<SessionClient> {
    let dir = clock_dir()?;
    let client = SessionClient::builder(config)
        .store(Arc::new(FileStore::new(&dir)))
        .build()
        .context("Failed to build HTTP client")?;
    Ok(client)
}

pub async fn login(client: &SessionClient, email: String, password: String) -> Result<()> {
    let account = client
        .login(&LoginRequest { email, password })
        .await
        .context("Login failed")?;
    println!("Logged in as {} ({})", account.email, account.id);
    Ok(())
}

/// `tether check`: fetch the server's runtime configuration.
pub async fn run_check(config: ClientConfig) -> Result<()> {
    let client = build_client(config)?;
    println!("Checking {}...", client.base_url());
    let runtime = client
        .runtime_config()
        .await
        .context("Failed to load runtime configuration")?;
    println!("{}", serde_json::to_string_pretty(&runtime)?);
    Ok(())
}

/// `tether session`: log in, then keep fetching the account until the
/// session expires or `polls` fetches have been made.
pub async fn run_session(
    config: ClientConfig,
    email: String,
    password: String,
    polls: Option<u32>,
) -> Result<()> {
    let period = config.session.access_window().max(Duration::from_secs(1)) / 2;
    let client = build_client(config)?;
    login(&client, email, password).await?;

    let watcher = client.start_watcher();
    let mut changes = client.subscribe();
    let mut last = client.snapshot();
    let mut ticker = tokio::time::interval(period);
    let mut done = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if polls.is_some_and(|max| done >= max) {
                    break;
                }
                done += 1;
                match client.account().await {
                    Ok(account) => println!("[{done}] account {} ok", account.email),
                    Err(e) => println!("[{done}] {e}"),
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = changes.borrow_and_update().clone();
                print_transition(&last, &current);
                last = current;
            }
        }
        if client.snapshot().expired {
            println!("Session expired.");
            break;
        }
    }

    watcher.stop();
    Ok(())
}

fn print_transition(before: &ClientState, after: &ClientState) {
    if before.status != after.status {
        println!("  status {} -> {}", before.status, after.status);
    }
    if before.error != after.error && !after.error.is_empty() {
        println!("  error: {}", after.error);
    }
    if before.expired != after.expired {
        println!("  expired = {}", after.expired);
    }
}
