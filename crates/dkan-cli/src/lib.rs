//! DKAN CLI Library
//!
//! Command-line interface for harvesting catalogs and loading resources into
//! the datastore.
//!
//! # Overview
//!
//! - **Harvests**: register, run, revert and inspect harvest plans (`dkan harvest`)
//! - **Datastore**: import resources into tables and manage them (`dkan datastore`)
//! - **Dictionaries**: store data dictionaries and distributions (`dkan dictionary`)
//! - **Queues**: drain the import and post-import queues (`dkan queue run`)

pub mod app;
pub mod commands;
pub mod config;

pub use app::App;
pub use config::Config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DKAN - harvest and datastore tooling
#[derive(Parser, Debug)]
#[command(name = "dkan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Print the command reference as markdown and exit
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage and run harvest plans
    Harvest {
        #[command(subcommand)]
        command: HarvestCommand,
    },

    /// Import resources into the datastore
    Datastore {
        #[command(subcommand)]
        command: DatastoreCommand,
    },

    /// Manage data dictionaries and the distributions that reference them
    Dictionary {
        #[command(subcommand)]
        command: DictionaryCommand,
    },

    /// Work through queued imports and post-import processing
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum HarvestCommand {
    /// Register a harvest plan from a JSON file
    Register {
        /// Path to the plan
        plan: PathBuf,
    },

    /// Run a registered plan
    Run {
        plan_id: String,
    },

    /// Undo the most recent run of a plan
    Revert {
        plan_id: String,
    },

    /// List registered plans
    List,

    /// Show a plan's runs, or one run in detail
    Info {
        plan_id: String,

        /// Run identifier (defaults to the latest run)
        #[arg(short, long)]
        run: Option<String>,
    },

    /// Revert every run and remove the plan
    Deregister {
        plan_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatastoreCommand {
    /// Register a resource and import it
    Import {
        /// URL or path of the file
        uri: String,

        /// Mime type (guessed from the extension when omitted)
        #[arg(short, long)]
        mime_type: Option<String>,

        /// Only queue the import; `dkan queue run` does the work
        #[arg(short, long)]
        queue: bool,
    },

    /// Show import status, columns and row count
    Status {
        /// Resource identifier
        identifier: String,

        /// Resource version (required when several are registered)
        #[arg(short = 'V', long)]
        version: Option<String>,
    },

    /// Stop an unfinished import
    Stop {
        identifier: String,

        #[arg(short = 'V', long)]
        version: Option<String>,
    },

    /// Drop a resource's table and import state
    Drop {
        identifier: String,

        #[arg(short = 'V', long)]
        version: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DictionaryCommand {
    /// Store a data dictionary from a JSON file
    Add {
        /// Path to a `{identifier, data}` document
        file: PathBuf,
    },

    /// Print a stored dictionary
    Show {
        identifier: String,
    },

    /// List stored dictionaries
    List,

    /// Store a distribution from a JSON file
    AddDistribution {
        /// Path to a `{identifier, data}` distribution document
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Drain the import queue, then the post-import queue
    Run {
        /// Time budget in seconds (defaults to DKAN_QUEUE_TIME_LIMIT)
        #[arg(short, long)]
        time_limit: Option<u64>,
    },
}
