//! `dkan datastore` commands

use super::print_json;
use crate::App;
use dkan_common::JobStatus;
use serde_json::json;

/// Register a resource and import it
///
/// Without `queue` the import runs to completion here, followed by the
/// post-import chain.
pub async fn import(app: &App, uri: &str, mime_type: Option<&str>, queue: bool, json: bool) -> anyhow::Result<()> {
    let resource = app.datastore.register_resource(uri, mime_type).await?;

    if queue {
        let item_id = app.datastore.enqueue_import(&resource).await?;
        if json {
            return print_json(&json!({"resource": resource, "queue_item": item_id}));
        }
        println!("Queued import of {} (resource {})", uri, resource.identifier);
        return Ok(());
    }

    let mut result = app.datastore.import(&resource).await?;
    while !result.status.is_terminal() {
        result = app.datastore.import(&resource).await?;
    }
    let post_import = if result.status == JobStatus::Done {
        Some(app.datastore.post_process(&resource).await?)
    } else {
        None
    };

    if json {
        return print_json(&json!({
            "resource": resource,
            "import": result,
            "post_import": post_import,
        }));
    }

    println!("Resource {} version {}", resource.identifier, resource.version);
    println!("  Import:      {}", result.status);
    if let Some(error) = &result.error {
        println!("  Error:       {error}");
    }
    if let Some(post) = post_import {
        println!("  Post-import: {}", post.result.status);
        if let Some(error) = &post.result.error {
            println!("  Error:       {error}");
        }
    }
    if result.status == JobStatus::Error {
        anyhow::bail!("Import of {uri} failed");
    }
    Ok(())
}

pub async fn status(app: &App, identifier: &str, version: Option<&str>, json: bool) -> anyhow::Result<()> {
    let resource = app.datastore.resource(identifier, version).await?;
    let summary = app.datastore.summary(&resource).await?;
    let post_import = app.datastore.post_import_result(&resource).await?;

    if json {
        return print_json(&json!({
            "resource": resource,
            "summary": summary,
            "post_import": post_import,
        }));
    }

    println!("Resource {} version {}", resource.identifier, resource.version);
    println!("  Source:   {}", resource.file_path);
    println!("  Table:    {}", summary.table_name);
    println!("  Status:   {} ({:.0}%)", summary.result.status, summary.result.percent_done);
    println!("  Rows:     {}", summary.row_count);
    println!("  Columns:  {}", summary.columns.join(", "));
    if let Some(error) = &summary.result.error {
        println!("  Error:    {error}");
    }
    if let Some(post) = post_import {
        println!("  Post-import: {}", post.result.status);
    }
    Ok(())
}

pub async fn stop(app: &App, identifier: &str, version: Option<&str>, json: bool) -> anyhow::Result<()> {
    let resource = app.datastore.resource(identifier, version).await?;
    let result = app.datastore.stop(&resource).await?;
    if json {
        return print_json(&result);
    }
    println!("Import of {} is {}", resource.identifier, result.status);
    Ok(())
}

pub async fn drop(app: &App, identifier: &str, version: Option<&str>, json: bool) -> anyhow::Result<()> {
    let resource = app.datastore.resource(identifier, version).await?;
    let table = app.datastore.table_name(&resource);
    app.datastore.drop(&resource).await?;
    if json {
        return print_json(&json!({"resource": resource, "dropped": table}));
    }
    println!("Dropped {table}");
    Ok(())
}
