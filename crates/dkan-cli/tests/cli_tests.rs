//! End-to-end command tests against a SQLite file

use anyhow::Result;
use dkan_cli::{commands, App, Config};
use dkan_common::JobStatus;
use dkan_datastore::DatastoreConfig;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn workspace_fixture(crate_name: &str, name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(crate_name)
        .join("tests/fixtures")
        .join(name)
}

fn config(dir: &TempDir) -> Config {
    Config {
        database_url: format!("sqlite://{}", dir.path().join("dkan.db").display()),
        datastore: DatastoreConfig {
            files_dir: dir.path().join("files"),
            ..DatastoreConfig::default()
        },
        ..Config::default()
    }
}

#[tokio::test]
async fn test_harvest_commands_persist_between_apps() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let plan_path = dir.path().join("plan.json");
    std::fs::write(
        &plan_path,
        serde_json::to_string(&json!({
            "identifier": "springfield",
            "extract": {
                "type": "data_json",
                "uri": workspace_fixture("dkan-harvest", "data.json").to_string_lossy()
            },
            "load": {"type": "dataset"}
        }))?,
    )?;

    let app = App::new(config(&dir)).await?;
    commands::harvest::register(&app, &plan_path, true).await?;
    commands::harvest::run(&app, "springfield", false).await?;
    drop(app);

    // A fresh process sees the same plans, runs and items
    let app = App::new(config(&dir)).await?;
    assert_eq!(app.harvest.plan_ids().await?, vec!["springfield"]);
    let last = app.harvest.last_run("springfield").await?;
    assert_eq!(last.map(|r| r.interpreter().count_created()), Some(10));
    assert_eq!(app.harvest.harvested_items("springfield").await?.len(), 10);

    commands::harvest::info(&app, "springfield", None, false).await?;
    commands::harvest::revert(&app, "springfield", false).await?;
    assert!(app.harvest.harvested_items("springfield").await?.is_empty());

    commands::harvest::deregister(&app, "springfield", false).await?;
    assert!(app.harvest.plan_ids().await?.is_empty());
    assert!(commands::harvest::info(&app, "springfield", None, false).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_queued_import_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv = workspace_fixture("dkan-datastore", "inspections.csv");

    let app = App::new(config(&dir)).await?;
    commands::datastore::import(&app, &csv.to_string_lossy(), None, true, false).await?;
    drop(app);

    let app = App::new(config(&dir)).await?;
    commands::queue::run(&app, Some(30), false).await?;

    let resource = app.datastore.resource(&dkan_common::checksum::md5_hex(&csv.to_string_lossy()), None).await?;
    let summary = app.datastore.summary(&resource).await?;
    assert_eq!(summary.result.status, JobStatus::Done);
    assert_eq!(summary.row_count, 12);

    let post = app.datastore.post_import_result(&resource).await?;
    assert_eq!(post.map(|p| p.result.status), Some(JobStatus::Done));

    commands::datastore::drop(&app, &resource.identifier, None, false).await?;
    assert_eq!(app.datastore.summary(&resource).await?.row_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_direct_import_reports_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = App::new(config(&dir)).await?;
    let csv = workspace_fixture("dkan-datastore", "ragged.csv");

    let err = commands::datastore::import(&app, &csv.to_string_lossy(), None, false, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed"));
    Ok(())
}

#[tokio::test]
async fn test_dictionary_commands() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = App::new(config(&dir)).await?;

    let path = dir.path().join("dictionary.json");
    std::fs::write(
        &path,
        serde_json::to_string(&json!({
            "identifier": "dict-1",
            "data": {"fields": [{"name": "score", "type": "integer"}]}
        }))?,
    )?;
    commands::dictionary::add(&app, &path, false).await?;
    commands::dictionary::show(&app, "dict-1", false).await?;
    assert_eq!(app.datastore.dictionary_ids().await?, vec!["dict-1"]);
    assert!(commands::dictionary::show(&app, "missing", false).await.is_err());
    Ok(())
}
