//! CLI command implementations
//!
//! Each command group has its own module; every function takes the shared
//! [`App`](crate::App) and prints its outcome.

pub mod datastore;
pub mod dictionary;
pub mod harvest;
pub mod queue;

use serde::Serialize;
use serde_json::Value;
use std::path::Path;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Invalid JSON in {}: {e}", path.display()))
}
