//! DKAN CLI - Main entry point

use clap::Parser;
use dkan_cli::{
    commands, App, Cli, Commands, Config, DatastoreCommand, DictionaryCommand, HarvestCommand,
    QueueCommand,
};
use dkan_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = &cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("dkan")
        .build();

    // Environment variables take precedence over the flags
    let log_config = match log_config.merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(command, cli.json).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(command: &Commands, json: bool) -> anyhow::Result<()> {
    let app = App::new(Config::load()?).await?;

    match command {
        Commands::Harvest { command } => match command {
            HarvestCommand::Register { plan } => commands::harvest::register(&app, plan, json).await,
            HarvestCommand::Run { plan_id } => commands::harvest::run(&app, plan_id, json).await,
            HarvestCommand::Revert { plan_id } => commands::harvest::revert(&app, plan_id, json).await,
            HarvestCommand::List => commands::harvest::list(&app, json).await,
            HarvestCommand::Info { plan_id, run } => {
                commands::harvest::info(&app, plan_id, run.as_deref(), json).await
            }
            HarvestCommand::Deregister { plan_id } => {
                commands::harvest::deregister(&app, plan_id, json).await
            }
        },

        Commands::Datastore { command } => match command {
            DatastoreCommand::Import { uri, mime_type, queue } => {
                commands::datastore::import(&app, uri, mime_type.as_deref(), *queue, json).await
            }
            DatastoreCommand::Status { identifier, version } => {
                commands::datastore::status(&app, identifier, version.as_deref(), json).await
            }
            DatastoreCommand::Stop { identifier, version } => {
                commands::datastore::stop(&app, identifier, version.as_deref(), json).await
            }
            DatastoreCommand::Drop { identifier, version } => {
                commands::datastore::drop(&app, identifier, version.as_deref(), json).await
            }
        },

        Commands::Dictionary { command } => match command {
            DictionaryCommand::Add { file } => commands::dictionary::add(&app, file, json).await,
            DictionaryCommand::Show { identifier } => {
                commands::dictionary::show(&app, identifier, json).await
            }
            DictionaryCommand::List => commands::dictionary::list(&app, json).await,
            DictionaryCommand::AddDistribution { file } => {
                commands::dictionary::add_distribution(&app, file, json).await
            }
        },

        Commands::Queue { command } => match command {
            QueueCommand::Run { time_limit } => commands::queue::run(&app, *time_limit, json).await,
        },
    }
}
