//! `dkan queue` commands

use super::print_json;
use crate::App;
use dkan_datastore::Queue;
use std::time::Duration;

pub async fn run(app: &App, time_limit: Option<u64>, json: bool) -> anyhow::Result<()> {
    let time_limit = time_limit
        .map(Duration::from_secs)
        .unwrap_or(app.config.queue_time_limit);
    let report = app.datastore.run_queues(time_limit).await?;
    let remaining = app.datastore.import_queue().len().await? + app.datastore.post_import_queue().len().await?;

    if json {
        return print_json(&serde_json::json!({"report": report, "remaining": remaining}));
    }
    println!(
        "Imports:      {} finished, {} requeued, {} failed",
        report.import.processed, report.import.requeued, report.import.failed
    );
    println!(
        "Post-import:  {} finished, {} failed",
        report.post_import.processed, report.post_import.failed
    );
    println!("Remaining:    {remaining}");
    Ok(())
}
