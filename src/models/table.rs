//! Table-related models

use super::empty_as_none;
use serde::Deserialize;

/// Column of a table (or of a tabular function parameter)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnSchema {
    pub name: String,
    /// Kusto scalar type name, e.g. `string`, `long`, `dynamic`
    pub csl_type: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub doc_string: Option<String>,
}

impl ColumnSchema {
    #[allow(dead_code)]
    pub fn new(name: impl Into<String>, csl_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            csl_type: csl_type.into(),
            doc_string: None,
        }
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableSchema {
    #[serde(default)]
    pub name: String,
    /// Logical grouping path, `None` when the table sits at the top level
    #[serde(default, deserialize_with = "empty_as_none")]
    pub folder: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub doc_string: Option<String>,
    #[serde(rename = "OrderedColumns", default)]
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    #[allow(dead_code)]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            folder: None,
            doc_string: None,
            columns,
        }
    }

    #[allow(dead_code)]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into()).filter(|f: &String| !f.is_empty());
        self
    }

    #[allow(dead_code)]
    pub fn with_doc_string(mut self, doc_string: impl Into<String>) -> Self {
        self.doc_string = Some(doc_string.into()).filter(|d: &String| !d.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_table() {
        let json = r#"{
            "Name": "StormEvents",
            "EntityType": "Table",
            "Folder": "Weather",
            "DocString": "",
            "OrderedColumns": [
                {"Name": "StartTime", "Type": "System.DateTime", "CslType": "datetime"},
                {"Name": "State", "Type": "System.String", "CslType": "string", "DocString": "US state"}
            ]
        }"#;

        let table: TableSchema = serde_json::from_str(json).unwrap();

        assert_eq!(table.name, "StormEvents");
        assert_eq!(table.folder.as_deref(), Some("Weather"));
        assert_eq!(table.doc_string, None);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].csl_type, "datetime");
        assert_eq!(table.columns[1].doc_string.as_deref(), Some("US state"));
    }

    #[test]
    fn test_missing_optional_fields() {
        let table: TableSchema = serde_json::from_str(r#"{"Name": "T"}"#).unwrap();
        assert_eq!(table, TableSchema::new("T", vec![]));
    }
}
