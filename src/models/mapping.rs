//! Ingestion mapping models
//!
//! A table owns zero or more named mappings, each tagged with a data format.
//! The shape of a column-mapping entry depends on that format, so entries are
//! modelled as one variant per format family, each holding only its own fields.

use crate::error::{retrieval_error, AppError, AppResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Data format an ingestion mapping applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKind {
    ApacheAvro,
    Avro,
    Csv,
    Json,
    Orc,
    Parquet,
    W3CLogFile,
}

impl MappingKind {
    /// Canonical name as reported by the cluster; also the sort key for mappings
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingKind::ApacheAvro => "ApacheAvro",
            MappingKind::Avro => "Avro",
            MappingKind::Csv => "Csv",
            MappingKind::Json => "Json",
            MappingKind::Orc => "Orc",
            MappingKind::Parquet => "Parquet",
            MappingKind::W3CLogFile => "W3CLogFile",
        }
    }

    /// Keyword used in `.create-or-alter table ... ingestion <kind> mapping`
    pub fn keyword(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MappingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "apacheavro" => MappingKind::ApacheAvro,
            "avro" => MappingKind::Avro,
            "csv" => MappingKind::Csv,
            "json" => MappingKind::Json,
            "orc" => MappingKind::Orc,
            "parquet" => MappingKind::Parquet,
            "w3clogfile" => MappingKind::W3CLogFile,
            _ => return Err(format!("Unsupported ingestion mapping kind '{}'", s)),
        };
        Ok(kind)
    }
}

/// Column mapping for JSON-like formats (Json, Parquet, Orc, W3CLogFile)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JsonColumnMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(rename = "ConstValue", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<String>,
}

/// Column mapping for delimited text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsvColumnMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub const_value: Option<String>,
}

/// Column mapping for Avro formats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvroColumnMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// One entry of a mapping's column list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnMapping {
    Json(JsonColumnMapping),
    Csv(CsvColumnMapping),
    Avro(AvroColumnMapping),
}

impl ColumnMapping {
    /// Decode one entry of a mapping JSON array for the given kind
    ///
    /// Accepts both the flat legacy layout and the `Properties` layout.
    pub fn from_value(kind: MappingKind, value: &Value) -> AppResult<Self> {
        let entry = value
            .as_object()
            .ok_or_else(|| retrieval_error(format!("{} column mapping is not an object: {}", kind, value)))?;
        let props = entry.get("Properties").and_then(Value::as_object);
        let prop = |key: &str| props.and_then(|p| text(p, key));

        if let Some(props) = props {
            let known = known_properties(kind);
            for key in props.keys().filter(|k| !known.contains(&k.as_str())) {
                warn!(
                    "Ignoring unsupported {} column mapping property '{}' in {}",
                    kind, key, value
                );
            }
        }

        let mapping = match kind {
            MappingKind::Csv => ColumnMapping::Csv(CsvColumnMapping {
                name: text(entry, "Name").or_else(|| text(entry, "column")),
                data_type: text(entry, "DataType").or_else(|| text(entry, "datatype")),
                csv_data_type: text(entry, "CsvDataType"),
                ordinal: match ordinal(entry, "Ordinal")? {
                    Some(o) => Some(o),
                    None => props.map(|p| ordinal(p, "Ordinal")).transpose()?.flatten(),
                },
                const_value: text(entry, "ConstValue").or_else(|| prop("ConstValue")),
            }),
            MappingKind::Avro | MappingKind::ApacheAvro => ColumnMapping::Avro(AvroColumnMapping {
                column: text(entry, "column"),
                datatype: text(entry, "datatype"),
                path: text(entry, "path").or_else(|| prop("Path")),
                transform: text(entry, "transform").or_else(|| prop("Transform")),
                field: text(entry, "field").or_else(|| prop("Field")),
            }),
            MappingKind::Json | MappingKind::Parquet | MappingKind::Orc | MappingKind::W3CLogFile => {
                ColumnMapping::Json(JsonColumnMapping {
                    column: text(entry, "column"),
                    path: text(entry, "path").or_else(|| prop("Path")),
                    datatype: text(entry, "datatype"),
                    transform: text(entry, "transform").or_else(|| prop("Transform")),
                    const_value: text(entry, "ConstValue").or_else(|| prop("ConstValue")),
                })
            }
        };

        Ok(mapping)
    }

    /// Decode a whole mapping JSON array for the given kind
    pub fn parse_list(kind: MappingKind, json: &str) -> AppResult<Vec<Self>> {
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(json)
            .map_err(|e| retrieval_error(format!("Malformed {} mapping JSON: {}", kind, e)))?;

        match value {
            Value::Array(entries) => entries.iter().map(|e| Self::from_value(kind, e)).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(retrieval_error(format!(
                "{} mapping JSON is not an array: {}",
                kind, other
            ))),
        }
    }

    /// Serialize to a single-line JSON object, omitting unset fields
    pub fn to_json(&self) -> String {
        // Every field is a string or an integer, so serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// `Properties` keys carried by each kind family
fn known_properties(kind: MappingKind) -> &'static [&'static str] {
    match kind {
        MappingKind::Csv => &["Ordinal", "ConstValue"],
        MappingKind::Avro | MappingKind::ApacheAvro => &["Path", "Transform", "Field"],
        MappingKind::Json | MappingKind::Parquet | MappingKind::Orc | MappingKind::W3CLogFile => {
            &["Path", "Transform", "ConstValue"]
        }
    }
}

/// Non-empty string value of `key`; numbers and booleans are stringified
fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Ordinal value of `key`, accepting either a number or a numeric string
fn ordinal(obj: &Map<String, Value>, key: &str) -> AppResult<Option<u32>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| retrieval_error(format!("Invalid Csv ordinal '{}'", s))),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| retrieval_error(format!("Invalid Csv ordinal {}", n))),
        Some(other) => Err(retrieval_error(format!("Invalid Csv ordinal {}", other))),
    }
}

/// Named ingestion mapping owned by a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionMapping {
    pub table_name: String,
    pub name: String,
    pub kind: MappingKind,
    pub column_mappings: Vec<ColumnMapping>,
}

impl IngestionMapping {
    pub fn new(
        table_name: impl Into<String>,
        name: impl Into<String>,
        kind: MappingKind,
        column_mappings: Vec<ColumnMapping>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            name: name.into(),
            kind,
            column_mappings,
        }
    }

    /// Build a mapping from one `.show ingestion mappings` row
    ///
    /// Positional layout: name, kind, mapping JSON, (last updated), (database), table.
    pub fn from_row(row: &[Value]) -> AppResult<Self> {
        if row.len() < 6 {
            return Err(retrieval_error(format!(
                "Ingestion mapping row has {} columns, expected at least 6",
                row.len()
            )));
        }

        let name = cell_str(row, 0, "mapping name")?;
        let kind_str = cell_str(row, 1, "mapping kind")?;
        let table_name = cell_str(row, 5, "table name")?;
        let context = |message: String| {
            retrieval_error(format!(
                "Ingestion mapping '{}' on table '{}': {}",
                name, table_name, message
            ))
        };

        let kind = MappingKind::from_str(kind_str).map_err(context)?;

        let column_mappings = match &row[2] {
            Value::String(json) => ColumnMapping::parse_list(kind, json),
            Value::Array(entries) => entries
                .iter()
                .map(|e| ColumnMapping::from_value(kind, e))
                .collect::<AppResult<Vec<_>>>(),
            Value::Null => Ok(Vec::new()),
            other => Err(retrieval_error(format!("unexpected column list: {}", other))),
        }
        .map_err(|e| match e {
            AppError::Retrieval(message) => context(message),
            other => other,
        })?;

        Ok(Self::new(table_name, name, kind, column_mappings))
    }
}

fn cell_str<'a>(row: &'a [Value], index: usize, what: &str) -> AppResult<&'a str> {
    row.get(index)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| retrieval_error(format!("Ingestion mapping row is missing the {}", what)))
}

/// Ingestion mappings grouped by owning table name
pub type MappingsByTable = BTreeMap<String, Vec<IngestionMapping>>;

/// Group mappings by owning table, keeping every mapping of every table
pub fn group_by_table(mappings: impl IntoIterator<Item = IngestionMapping>) -> MappingsByTable {
    let mut grouped = MappingsByTable::new();
    for mapping in mappings {
        grouped
            .entry(mapping.table_name.clone())
            .or_default()
            .push(mapping);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!("json".parse::<MappingKind>().unwrap(), MappingKind::Json);
        assert_eq!("CSV".parse::<MappingKind>().unwrap(), MappingKind::Csv);
        assert_eq!("ApacheAvro".parse::<MappingKind>().unwrap(), MappingKind::ApacheAvro);
        assert!("sstream2".parse::<MappingKind>().is_err());
        assert_eq!(MappingKind::W3CLogFile.keyword(), "w3clogfile");
    }

    #[test]
    fn test_json_mapping_omits_unset_fields() {
        let mapping = ColumnMapping::from_value(
            MappingKind::Json,
            &json!({"column": "a", "path": "$.a", "datatype": "", "transform": null}),
        )
        .unwrap();

        assert_eq!(mapping.to_json(), r#"{"column":"a","path":"$.a"}"#);
    }

    #[test]
    fn test_properties_layout() {
        let mapping = ColumnMapping::from_value(
            MappingKind::Json,
            &json!({"column": "ts", "datatype": "datetime", "Properties": {"Path": "$.ts", "Transform": "DateTimeFromUnixSeconds"}}),
        )
        .unwrap();

        assert_eq!(
            mapping,
            ColumnMapping::Json(JsonColumnMapping {
                column: Some("ts".to_string()),
                path: Some("$.ts".to_string()),
                datatype: Some("datetime".to_string()),
                transform: Some("DateTimeFromUnixSeconds".to_string()),
                const_value: None,
            })
        );
    }

    #[test]
    fn test_csv_ordinal_as_string() {
        let mapping = ColumnMapping::from_value(
            MappingKind::Csv,
            &json!({"Name": "a", "DataType": "string", "Ordinal": "3", "ConstValue": null}),
        )
        .unwrap();

        assert_eq!(mapping.to_json(), r#"{"Name":"a","DataType":"string","Ordinal":3}"#);
    }

    #[test]
    fn test_csv_invalid_ordinal() {
        let result = ColumnMapping::from_value(MappingKind::Csv, &json!({"Name": "a", "Ordinal": "x"}));
        assert!(matches!(result, Err(crate::error::AppError::Retrieval(_))));
    }

    #[test]
    fn test_avro_field() {
        let mapping = ColumnMapping::from_value(
            MappingKind::Avro,
            &json!({"column": "a", "field": "rec.a", "ordinal": 4}),
        )
        .unwrap();

        assert_eq!(mapping.to_json(), r#"{"column":"a","field":"rec.a"}"#);
    }

    #[test]
    fn test_apache_avro_path_from_properties() {
        let mapping = ColumnMapping::from_value(
            MappingKind::ApacheAvro,
            &json!({"column": "a", "datatype": "long", "Properties": {"Path": "$.a"}}),
        )
        .unwrap();

        assert_eq!(mapping.to_json(), r#"{"column":"a","datatype":"long","path":"$.a"}"#);
        assert_eq!(
            ColumnMapping::parse_list(MappingKind::ApacheAvro, &format!("[{}]", mapping.to_json())).unwrap(),
            vec![mapping]
        );
    }

    #[test]
    fn test_json_const_value_from_properties() {
        let mapping = ColumnMapping::from_value(
            MappingKind::Json,
            &json!({"column": "k", "Properties": {"ConstValue": "x"}}),
        )
        .unwrap();

        assert_eq!(mapping.to_json(), r#"{"column":"k","ConstValue":"x"}"#);
        assert_eq!(
            ColumnMapping::parse_list(MappingKind::Json, &format!("[{}]", mapping.to_json())).unwrap(),
            vec![mapping]
        );
    }

    #[test]
    fn test_flat_and_properties_layouts_agree() {
        let flat = ColumnMapping::from_value(
            MappingKind::ApacheAvro,
            &json!({"column": "a", "path": "$.a", "transform": "DateTimeFromUnixSeconds"}),
        )
        .unwrap();
        let nested = ColumnMapping::from_value(
            MappingKind::ApacheAvro,
            &json!({"column": "a", "Properties": {"Path": "$.a", "Transform": "DateTimeFromUnixSeconds"}}),
        )
        .unwrap();

        assert_eq!(flat, nested);
    }

    #[test]
    fn test_serialized_mappings_parse_back_unchanged() {
        let cases = vec![
            (
                MappingKind::Json,
                r#"[{"column":"a","path":"$.a","datatype":"string","transform":"x"},{"column":"b","path":"$.b"}]"#,
            ),
            (
                MappingKind::Csv,
                r#"[{"Name":"a","DataType":"int","CsvDataType":"int","Ordinal":0},{"Name":"b","ConstValue":"k"}]"#,
            ),
            (MappingKind::Avro, r#"[{"column":"a","datatype":"long","field":"a"}]"#),
        ];

        for (kind, json) in cases {
            let parsed = ColumnMapping::parse_list(kind, json).unwrap();
            let emitted = format!(
                "[{}]",
                parsed.iter().map(ColumnMapping::to_json).collect::<Vec<_>>().join(",")
            );
            assert_eq!(emitted, json);
            assert_eq!(ColumnMapping::parse_list(kind, &emitted).unwrap(), parsed);
        }
    }

    #[test]
    fn test_from_row() {
        let row = vec![
            json!("M"),
            json!("Json"),
            json!(r#"[{"column":"a","path":"$.a"}]"#),
            json!("2024-01-01T00:00:00Z"),
            json!("Sales"),
            json!("T"),
        ];

        let mapping = IngestionMapping::from_row(&row).unwrap();

        assert_eq!(mapping.table_name, "T");
        assert_eq!(mapping.name, "M");
        assert_eq!(mapping.kind, MappingKind::Json);
        assert_eq!(mapping.column_mappings.len(), 1);
    }

    #[test]
    fn test_unsupported_kind_names_table_and_mapping() {
        let row = vec![
            json!("Legacy"),
            json!("SStream"),
            json!("[]"),
            json!(null),
            json!("Sales"),
            json!("Events"),
        ];

        let message = IngestionMapping::from_row(&row).unwrap_err().to_string();

        assert!(message.contains("'Legacy'"));
        assert!(message.contains("'Events'"));
        assert!(message.contains("SStream"));
    }

    #[test]
    fn test_bad_column_entry_names_table_and_mapping() {
        let row = vec![
            json!("ByOrdinal"),
            json!("Csv"),
            json!(r#"[{"Name":"a","Ordinal":"first"}]"#),
            json!(null),
            json!("Sales"),
            json!("Orders"),
        ];

        let message = IngestionMapping::from_row(&row).unwrap_err().to_string();

        assert!(message.contains("'ByOrdinal' on table 'Orders'"));
        assert!(message.contains("Invalid Csv ordinal"));
    }

    #[test]
    fn test_short_row_is_rejected() {
        let row = vec![json!("M"), json!("Json"), json!("[]")];
        assert!(IngestionMapping::from_row(&row).is_err());
    }

    #[test]
    fn test_group_by_table_keeps_all_mappings() {
        let grouped = group_by_table(vec![
            IngestionMapping::new("T", "b", MappingKind::Json, vec![]),
            IngestionMapping::new("U", "a", MappingKind::Csv, vec![]),
            IngestionMapping::new("T", "a", MappingKind::Json, vec![]),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["T"].len(), 2);
        assert_eq!(grouped["U"].len(), 1);
    }
}
