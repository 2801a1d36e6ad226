//! `dkan dictionary` commands

use super::{print_json, read_json};
use crate::App;
use dkan_datastore::{DataDictionary, Distribution};
use serde_json::json;
use std::path::Path;

pub async fn add(app: &App, file: &Path, json: bool) -> anyhow::Result<()> {
    let dictionary: DataDictionary = serde_json::from_value(read_json(file).await?)?;
    app.datastore.save_dictionary(&dictionary).await?;
    if json {
        return print_json(&json!({"identifier": dictionary.identifier}));
    }
    println!(
        "Stored dictionary {} ({} fields)",
        dictionary.identifier,
        dictionary.data.fields.len()
    );
    Ok(())
}

pub async fn show(app: &App, identifier: &str, json: bool) -> anyhow::Result<()> {
    let dictionary = app
        .datastore
        .dictionary(identifier)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Data dictionary {identifier} not found"))?;
    if json {
        return print_json(&dictionary);
    }

    println!("{}", dictionary.data.title.as_deref().unwrap_or(&dictionary.identifier));
    for field in &dictionary.data.fields {
        let format = field.format.as_deref().map(|f| format!(" [{f}]")).unwrap_or_default();
        println!("  {} {}{format}", field.name, field.field_type);
    }
    for index in &dictionary.data.indexes {
        let fields: Vec<&str> = index.fields.iter().map(|f| f.name.as_str()).collect();
        println!(
            "  index {} ({})",
            index.name.as_deref().unwrap_or("-"),
            fields.join(", ")
        );
    }
    Ok(())
}

pub async fn list(app: &App, json: bool) -> anyhow::Result<()> {
    let ids = app.datastore.dictionary_ids().await?;
    if json {
        return print_json(&ids);
    }
    if ids.is_empty() {
        println!("No data dictionaries stored.");
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

pub async fn add_distribution(app: &App, file: &Path, json: bool) -> anyhow::Result<()> {
    let distribution: Distribution = serde_json::from_value(read_json(file).await?)?;
    app.datastore.save_distribution(&distribution).await?;
    if json {
        return print_json(&json!({"identifier": distribution.identifier}));
    }
    println!("Stored distribution {}", distribution.identifier);
    if let Some(id) = distribution.dictionary_id() {
        println!("  Described by dictionary {id}");
    }
    Ok(())
}
