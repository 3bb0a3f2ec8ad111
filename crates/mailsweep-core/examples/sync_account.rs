#![allow(clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: run one sync pass against an Outlook mailbox
//!
//! ## Running
//!
//! ```bash
//! export MAILSWEEP_EMAIL="you@outlook.com"
//! export MAILSWEEP_CLIENT_ID="your-azure-app-client-id"
//! export MAILSWEEP_REFRESH_TOKEN="..."
//! # optional: JSON file overriding SyncConfig defaults
//! export MAILSWEEP_CONFIG="mailsweep.json"
//! RUST_LOG=mailsweep_core=debug cargo run --package mailsweep-core --example sync_account
//! ```

use std::env;

use anyhow::{Context, Result};
use mailsweep_core::{AccountId, MailAccount, MemoryStore, SyncConfig, SyncEngine};
use tracing_subscriber::EnvFilter;

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} is not set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match env::var("MAILSWEEP_CONFIG") {
        Ok(path) => SyncConfig::from_path(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => SyncConfig::default(),
    };

    let account = MailAccount::new(
        AccountId::new(1),
        required("MAILSWEEP_EMAIL")?,
        required("MAILSWEEP_REFRESH_TOKEN")?,
        required("MAILSWEEP_CLIENT_ID")?,
    );

    let engine = SyncEngine::from_config(config, MemoryStore::new())?;

    let result = engine
        .check_account(&account, |percent: u8, label: &str| {
            println!("[{:>3}%] {}", percent, label);
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    for message in engine.store().records(account.id) {
        println!(
            "- {} | {} | {}",
            message
                .received
                .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339()),
            message.sender,
            message.subject
        );
    }

    if !result.success {
        anyhow::bail!(result.message);
    }
    Ok(())
}
