//! Schema Snapshot Module
//!
//! Writes the live schema of each requested database into a tree of `.csl`
//! scripts:
//! - `store` reconciles generated scripts against a directory subtree
//! - `orchestrator` drives retrieval, generation and writing per database

pub mod orchestrator;
pub mod store;

pub use orchestrator::{SnapshotOrchestrator, SnapshotReport};
