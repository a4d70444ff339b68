//! Database-level schema model

use super::{FunctionSchema, TableSchema};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Complete schema of one database at one point in time
///
/// Tables and functions are keyed by name, so names are unique within the database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseSchema {
    pub name: String,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionSchema>,
}
