//! DKAN Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the DKAN harvest and datastore crates.
//!
//! # Overview
//!
//! - **Error Handling**: the [`DkanError`] taxonomy and [`Result`] alias
//! - **Checksums**: canonical JSON hashing and file checksums
//! - **Jobs**: the [`job::JobResult`] state primitive for long-running work
//! - **Storage**: the [`storage::JsonStore`] key/value contract with memory and SQLite backends
//! - **Logging**: `tracing` subscriber configuration
//!
//! # Example
//!
//! ```no_run
//! use dkan_common::checksum::content_hash;
//! use serde_json::json;
//!
//! let a = content_hash(&json!({"title": "Parks", "identifier": "1"}));
//! let b = content_hash(&json!({"identifier": "1", "title": "Parks"}));
//! assert_eq!(a, b);
//! ```

pub mod checksum;
pub mod error;
pub mod job;
pub mod logging;
pub mod storage;

// Re-export commonly used types
pub use error::{DkanError, Result};
pub use job::{JobResult, JobStatus};
pub use storage::{JsonStore, JsonStoreExt, StoreFactory};
