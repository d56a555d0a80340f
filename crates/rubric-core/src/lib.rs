//! rubric-core library.
//!
//! Weighted assessment trees per group, a score store with
//! placeholder/automatic/manual instances, and the engine that keeps
//! aggregated scores consistent as scores and the tree change.
//!
//! # Conventions
//!
//! - **Errors**: [`error::TreeError`] for engine operations, `anyhow::Result`
//!   for config and file plumbing.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod model;
pub mod report;
pub mod scoring;
pub mod tree;

pub use error::{ErrorCode, TreeError, TreeResult};
pub use scoring::Grader;
pub use tree::CategoryTree;
