//! Declarative script generation
//!
//! Renders tables, functions, and ingestion mappings as `.csl` commands laid
//! out for line-oriented diffs.

pub mod format;
pub mod generator;

pub use generator::ScriptGenerator;
