//! CSL script generator
//!
//! Turns schema model objects into the declarative commands that recreate them.
//! Output is deterministic: the same schema always yields byte-identical text.

use super::format::{break_lists, escape, normalize_name, string_literal};
use crate::models::{ColumnSchema, FunctionParameter, FunctionSchema, IngestionMapping, TableSchema};

pub struct ScriptGenerator;

impl ScriptGenerator {
    /// `.create-or-alter function` command for a stored function
    pub fn function_command(function: &FunctionSchema) -> String {
        let mut properties = Vec::new();
        if let Some(ref doc) = function.doc_string {
            properties.push(format!("docstring = {}", string_literal(doc)));
        }
        if let Some(ref folder) = function.folder {
            properties.push(format!("folder = {}", string_literal(folder)));
        }
        properties.push("skipvalidation = \"true\"".to_string());

        let parameters: Vec<String> = function.parameters.iter().map(Self::parameter).collect();

        format!(
            ".create-or-alter function with ({}) {}({}) {}",
            properties.join(", "),
            normalize_name(&function.name),
            parameters.join(", "),
            Self::body(&function.body)
        )
    }

    /// Single-line `.create-merge table` command
    pub fn table_command(table: &TableSchema) -> String {
        let mut sql = format!(
            ".create-merge table {} ({})",
            normalize_name(&table.name),
            Self::column_list(&table.columns)
        );

        let mut properties = Vec::new();
        if let Some(ref doc) = table.doc_string {
            properties.push(format!("docstring = {}", string_literal(doc)));
        }
        if let Some(ref folder) = table.folder {
            properties.push(format!("folder = {}", string_literal(folder)));
        }
        if !properties.is_empty() {
            sql.push_str(&format!(" with ({})", properties.join(", ")));
        }

        sql
    }

    /// `.create-or-alter table ... ingestion ... mapping` command with its column list
    pub fn mapping_command(mapping: &IngestionMapping) -> String {
        let mut lines = vec![
            format!(
                ".create-or-alter table {} ingestion {} mapping {}",
                normalize_name(&mapping.table_name),
                mapping.kind.keyword(),
                string_literal(&mapping.name)
            ),
            "'['".to_string(),
        ];

        let last = mapping.column_mappings.len().saturating_sub(1);
        for (i, column) in mapping.column_mappings.iter().enumerate() {
            let separator = if i < last { "," } else { "" };
            lines.push(format!("'  {}{}'", escape(&column.to_json(), '\''), separator));
        }

        lines.push("']'".to_string());
        lines.join("\n")
    }

    /// Full content of a table's script file: the table command laid out one
    /// column per line, followed by every mapping the table owns ordered by
    /// kind and then by name.
    pub fn table_script(table: &TableSchema, mappings: &[IngestionMapping]) -> String {
        let mut ordered: Vec<&IngestionMapping> = mappings.iter().collect();
        ordered.sort_by(|a, b| {
            a.kind
                .as_str()
                .cmp(b.kind.as_str())
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut blocks = vec![break_lists(&Self::table_command(table))];
        blocks.extend(ordered.into_iter().map(Self::mapping_command));
        blocks.join("\n\n")
    }

    fn column_list(columns: &[ColumnSchema]) -> String {
        columns
            .iter()
            .map(|c| format!("{}:{}", normalize_name(&c.name), c.csl_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn parameter(parameter: &FunctionParameter) -> String {
        let name = normalize_name(&parameter.name);

        if parameter.is_tabular() {
            let columns = if parameter.columns.is_empty() {
                "*".to_string()
            } else {
                Self::column_list(&parameter.columns)
            };
            return format!("{}:({})", name, columns);
        }

        let csl_type = parameter.csl_type.as_deref().unwrap_or("dynamic");
        match parameter.default_value {
            Some(ref default) => format!("{}:{} = {}", name, csl_type, default),
            None => format!("{}:{}", name, csl_type),
        }
    }

    fn body(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            trimmed.to_string()
        } else {
            format!("{{ {} }}", trimmed)
        }
    }
}
