//! Schema Introspection Module
//!
//! Reads a database's live schema and ingestion mappings from the cluster and
//! turns them into the schema model. The live cluster is the source of truth;
//! nothing is cached between runs.

use crate::connection::ClusterClient;
use crate::error::{not_found_error, retrieval_error, AppResult};
use crate::models::{group_by_table, DatabaseSchema, IngestionMapping, MappingsByTable};
use crate::script::format::normalize_name;
use serde_json::{Map, Value};
use tracing::debug;

/// Control command returning the full database schema as one JSON cell
pub fn schema_command(database: &str) -> String {
    format!(".show database {} schema as json", normalize_name(database))
}

/// Control command returning every ingestion mapping of every table, not only the latest
pub fn mappings_command(database: &str) -> String {
    format!(
        ".show database {} ingestion mappings with (onlyLatestPerTable=false)",
        normalize_name(database)
    )
}

/// Everything retrieved for one database
#[derive(Debug, Clone)]
pub struct DatabaseSnapshot {
    pub schema: DatabaseSchema,
    pub mappings: MappingsByTable,
}

impl DatabaseSnapshot {
    pub fn mapping_count(&self) -> usize {
        self.mappings.values().map(Vec::len).sum()
    }
}

/// Schema introspector
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Retrieve schema and ingestion mappings for `database`
    pub async fn introspect<C: ClusterClient + ?Sized>(
        client: &C,
        database: &str,
    ) -> AppResult<DatabaseSnapshot> {
        debug!("Introspecting schema of database {}", database);

        let schema = {
            let result = client
                .execute_control_command(database, &schema_command(database))
                .await?;
            let cell = result
                .first_cell()
                .ok_or_else(|| retrieval_error(format!("Empty schema response for database '{}'", database)))?;
            Self::parse_schema(cell, database)?
        };

        let mappings = {
            let result = client
                .execute_control_command(database, &mappings_command(database))
                .await?;
            let parsed = result
                .rows
                .iter()
                .map(|row| IngestionMapping::from_row(row))
                .collect::<AppResult<Vec<_>>>()?;
            group_by_table(parsed)
        };

        debug!(
            "Database {}: {} tables, {} functions, {} tables with mappings",
            database,
            schema.tables.len(),
            schema.functions.len(),
            mappings.len()
        );

        Ok(DatabaseSnapshot { schema, mappings })
    }

    /// Decode the schema envelope and pick out `database`
    ///
    /// The envelope may list several databases. The requested name is matched
    /// exactly first and then ignoring ASCII case.
    pub fn parse_schema(cell: &Value, database: &str) -> AppResult<DatabaseSchema> {
        let envelope = match cell {
            Value::String(json) => serde_json::from_str::<Value>(json)
                .map_err(|e| retrieval_error(format!("Malformed schema JSON: {}", e)))?,
            Value::Object(_) => cell.clone(),
            other => {
                return Err(retrieval_error(format!(
                    "Unexpected schema cell type: {}",
                    type_name(other)
                )))
            }
        };

        let databases = envelope
            .get("Databases")
            .and_then(Value::as_object)
            .ok_or_else(|| retrieval_error("Schema JSON has no 'Databases' object"))?;

        let entry = find_database(databases, database)
            .ok_or_else(|| not_found_error(format!("Database '{}' not present in schema response", database)))?;

        let mut schema: DatabaseSchema = serde_json::from_value(with_name(entry, database))
            .map_err(|e| retrieval_error(format!("Malformed schema for database '{}': {}", database, e)))?;

        // Keys are authoritative for object names
        for (name, table) in schema.tables.iter_mut() {
            if table.name.is_empty() {
                table.name = name.clone();
            }
        }
        for (name, function) in schema.functions.iter_mut() {
            if function.name.is_empty() {
                function.name = name.clone();
            }
        }

        Ok(schema)
    }
}

fn find_database<'a>(databases: &'a Map<String, Value>, database: &str) -> Option<&'a Value> {
    databases.get(database).or_else(|| {
        databases
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(database))
            .map(|(_, value)| value)
    })
}

fn with_name(entry: &Value, database: &str) -> Value {
    let mut entry = entry.clone();
    if let Value::Object(ref mut obj) = entry {
        obj.entry("Name")
            .or_insert_with(|| Value::String(database.to_string()));
    }
    entry
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockCluster;
    use crate::error::AppError;
    use crate::models::MappingKind;
    use serde_json::json;

    fn sales_envelope() -> Value {
        json!({
            "Databases": {
                "Sales": {
                    "Name": "Sales",
                    "Tables": {
                        "Orders": {
                            "Name": "Orders",
                            "Folder": "Core",
                            "DocString": "",
                            "OrderedColumns": [
                                {"Name": "Id", "CslType": "long"},
                                {"Name": "Customer", "CslType": "string", "DocString": "Customer key"}
                            ]
                        }
                    },
                    "Functions": {
                        "RecentOrders": {
                            "Name": "RecentOrders",
                            "Folder": "",
                            "Body": "{ Orders | take 10 }",
                            "InputParameters": []
                        }
                    }
                }
            }
        })
    }

    fn mapping_row(table: &str, name: &str, kind: &str, json: &str) -> Vec<Value> {
        vec![
            json!(name),
            json!(kind),
            json!(json),
            json!("2024-01-01T00:00:00Z"),
            json!("Sales"),
            json!(table),
        ]
    }

    #[test]
    fn test_commands_quote_database_names() {
        assert_eq!(schema_command("Sales"), ".show database Sales schema as json");
        assert_eq!(
            mappings_command("my db"),
            ".show database ['my db'] ingestion mappings with (onlyLatestPerTable=false)"
        );
    }

    #[test]
    fn test_parse_schema_from_string_cell() {
        let cell = Value::String(sales_envelope().to_string());
        let schema = SchemaIntrospector::parse_schema(&cell, "Sales").unwrap();

        assert_eq!(schema.name, "Sales");
        let orders = &schema.tables["Orders"];
        assert_eq!(orders.folder.as_deref(), Some("Core"));
        assert_eq!(orders.doc_string, None);
        assert_eq!(orders.columns.len(), 2);
        assert_eq!(schema.functions["RecentOrders"].folder, None);
    }

    #[test]
    fn test_parse_schema_case_insensitive_lookup() {
        let schema = SchemaIntrospector::parse_schema(&sales_envelope(), "sales").unwrap();
        assert_eq!(schema.name, "Sales");
    }

    #[test]
    fn test_parse_schema_missing_database() {
        let result = SchemaIntrospector::parse_schema(&sales_envelope(), "Marketing");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_parse_schema_malformed() {
        let result = SchemaIntrospector::parse_schema(&json!("not json"), "Sales");
        assert!(matches!(result, Err(AppError::Retrieval(_))));

        let result = SchemaIntrospector::parse_schema(&json!({"Other": {}}), "Sales");
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }

    #[tokio::test]
    async fn test_introspect_groups_all_mappings() {
        let cluster = MockCluster::new()
            .with_schema("Sales", sales_envelope())
            .with_mappings(
                "Sales",
                vec![
                    mapping_row("Orders", "v1", "Json", r#"[{"column":"Id","path":"$.id"}]"#),
                    mapping_row("Orders", "v2", "Json", r#"[{"column":"Id","path":"$.orderId"}]"#),
                    mapping_row("Orders", "csv", "Csv", r#"[{"Name":"Id","Ordinal":"0"}]"#),
                ],
            );

        let snapshot = SchemaIntrospector::introspect(&cluster, "Sales").await.unwrap();

        assert_eq!(snapshot.schema.tables.len(), 1);
        assert_eq!(snapshot.mapping_count(), 3);
        assert_eq!(snapshot.mappings["Orders"].len(), 3);
        assert_eq!(snapshot.mappings["Orders"][2].kind, MappingKind::Csv);

        let calls = cluster.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("Sales".to_string(), schema_command("Sales")));
        assert_eq!(calls[1], ("Sales".to_string(), mappings_command("Sales")));
    }

    #[tokio::test]
    async fn test_introspect_rejects_short_mapping_rows() {
        let cluster = MockCluster::new()
            .with_schema("Sales", sales_envelope())
            .with_mappings("Sales", vec![vec![json!("m"), json!("Json")]]);

        let result = SchemaIntrospector::introspect(&cluster, "Sales").await;
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }
}
