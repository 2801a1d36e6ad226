//! DKAN Datastore
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Imports tabular resources into dynamic tables and enforces data
//! dictionaries on them.
//!
//! # Overview
//!
//! - **Resources**: [`resource::DataResource`] and the [`resource::ResourceMapper`]
//! - **Fetching**: [`fetch::FileFetcher`] localizes remote files
//! - **Database**: [`database::Database`] with scoped strict-mode relaxation and
//!   [`database::DatabaseTable`] for dynamic schemas
//! - **Import**: resumable, time-boxed [`import::ImportJob`]s
//! - **Dictionaries**: discovery and table alteration in [`dictionary`]
//! - **Post-import**: [`post_import::PostImport`] processor chains
//! - **Queues**: [`queue::Queue`] with import and post-import workers
//!
//! [`DatastoreService`] ties these together.

pub mod config;
pub mod database;
pub mod dictionary;
pub mod fetch;
pub mod import;
pub mod metastore;
pub mod post_import;
pub mod queue;
pub mod resource;
pub mod service;

pub use config::{DatastoreConfig, DictionaryConfig};
pub use database::{Database, DatabaseTable, StrictModeOff};
pub use dictionary::{
    AlterPlan, DataDictionary, DictionaryDiscovery, DictionaryMode, DictionaryOutcome, DictionaryStore,
};
pub use fetch::FileFetcher;
pub use import::{ImportJob, ImportOptions, ImportService, ImportSummary};
pub use metastore::{Distribution, DistributionData, DistributionStore, ReferenceIndex};
pub use post_import::{PostImport, PostImportProcessor, PostImportResult};
pub use queue::{MemoryQueue, Queue, QueueRunner, QueueWorker, StoreQueue};
pub use resource::{DataResource, Perspective, ResourceMapper};
pub use service::{DatastoreService, QueueReport};
