//! `dkan harvest` commands

use super::{print_json, read_json};
use crate::App;
use dkan_harvest::HarvestRunResult;
use serde_json::json;
use std::path::Path;
use tracing::info;

pub async fn register(app: &App, plan: &Path, json: bool) -> anyhow::Result<()> {
    let plan_id = app.harvest.register_harvest(read_json(plan).await?).await?;
    info!(plan_id = %plan_id, "Registered harvest plan");
    if json {
        return print_json(&json!({"identifier": plan_id}));
    }
    println!("Registered harvest plan {plan_id}");
    Ok(())
}

pub async fn run(app: &App, plan_id: &str, json: bool) -> anyhow::Result<()> {
    let result = app.harvest.run_harvest(plan_id).await?;
    if json {
        return print_json(&result);
    }
    print_run(&result);
    Ok(())
}

pub async fn revert(app: &App, plan_id: &str, json: bool) -> anyhow::Result<()> {
    let reverted = app.harvest.revert_harvest(plan_id).await?;
    if json {
        return print_json(&json!({"identifier": plan_id, "reverted": reverted}));
    }
    println!("Reverted {reverted} items of harvest {plan_id}");
    Ok(())
}

pub async fn list(app: &App, json: bool) -> anyhow::Result<()> {
    let ids = app.harvest.plan_ids().await?;
    if json {
        return print_json(&ids);
    }
    if ids.is_empty() {
        println!("No harvest plans registered.");
        println!("Run 'dkan harvest register <plan.json>' to add one.");
        return Ok(());
    }
    for id in &ids {
        let last = app.harvest.last_run(id).await?;
        match last {
            Some(run) => println!("{id}  last run {} ({})", run.run_id, run.status.extract),
            None => println!("{id}  never run"),
        }
    }
    Ok(())
}

pub async fn info(app: &App, plan_id: &str, run_id: Option<&str>, json: bool) -> anyhow::Result<()> {
    if app.harvest.get_plan(plan_id).await?.is_none() {
        anyhow::bail!("Harvest plan {plan_id} is not registered");
    }

    let result = match run_id {
        Some(run_id) => app
            .harvest
            .run_result(plan_id, run_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Harvest {plan_id} has no run {run_id}"))?,
        None => match app.harvest.last_run(plan_id).await? {
            Some(run) => run,
            None => {
                if json {
                    return print_json(&json!({"identifier": plan_id, "runs": []}));
                }
                println!("Harvest {plan_id} has not been run.");
                return Ok(());
            }
        },
    };

    if json {
        return print_json(&result);
    }
    let runs = app.harvest.run_ids(plan_id).await?;
    println!("Harvest {plan_id}: {} runs", runs.len());
    print_run(&result);
    Ok(())
}

pub async fn deregister(app: &App, plan_id: &str, json: bool) -> anyhow::Result<()> {
    app.harvest.deregister_harvest(plan_id).await?;
    if json {
        return print_json(&json!({"identifier": plan_id, "deregistered": true}));
    }
    println!("Deregistered harvest plan {plan_id}");
    Ok(())
}

fn print_run(result: &HarvestRunResult) {
    let counts = result.interpreter();
    println!("Run {} of {}", result.run_id, result.plan_id);
    println!("  Extract:   {}", result.status.extract);
    if let Some(status) = result.status.transform {
        println!("  Transform: {status}");
    }
    if let Some(status) = result.status.load {
        println!("  Load:      {status}");
    }
    println!("  Processed: {}", counts.count_processed());
    println!("  Created:   {}", counts.count_created());
    println!("  Updated:   {}", counts.count_updated());
    println!("  Unchanged: {}", counts.count_unchanged());
    println!("  Removed:   {}", counts.count_removed());
    println!("  Failed:    {}", counts.count_failed());

    if let Some(error) = &result.errors.extract {
        println!("  Extract error: {error}");
    }
    for (id, error) in result.errors.transform.iter().chain(&result.errors.load) {
        println!("  {id}: {error}");
    }
}
