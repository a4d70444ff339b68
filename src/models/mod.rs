//! Schema model
//!
//! Read-only snapshot of one database's schema as reported by the cluster:
//! tables, functions, and the ingestion mappings owned by tables.

pub mod database;
pub mod function;
pub mod mapping;
pub mod table;

// Re-export commonly used types
pub use database::*;
pub use function::*;
pub use mapping::*;
pub use table::*;

use serde::{Deserialize, Deserializer};

/// Deserialize an optional string, treating `""` the same as an absent value
pub(crate) fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
