//! Orchestrator - snapshot every requested database into the output tree

use crate::connection::ClientProvider;
use crate::error::{AppError, AppResult};
use crate::introspection::{DatabaseSnapshot, SchemaIntrospector};
use crate::script::ScriptGenerator;
use crate::snapshot::store::{ScriptFile, ScriptStore, StoreStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-database outcome of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReport {
    pub database: String,
    pub output_dir: PathBuf,
    pub tables: usize,
    pub functions: usize,
    pub mappings: usize,
    pub files_written: usize,
    pub stale_removed: usize,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub databases: Vec<DatabaseReport>,
}

impl SnapshotReport {
    pub fn files_written(&self) -> usize {
        self.databases.iter().map(|d| d.files_written).sum()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Drives retrieval, script generation and materialization per database
pub struct SnapshotOrchestrator<P: ClientProvider> {
    provider: P,
    output_root: PathBuf,
}

impl<P: ClientProvider> SnapshotOrchestrator<P> {
    pub fn new(provider: P, output_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            output_root: output_root.into(),
        }
    }

    /// Output directory of one database
    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.output_root.join("db").join(database)
    }

    /// Snapshot `databases` in order, stopping at the first failure
    pub async fn run(&self, databases: &[String], cancel: &CancellationToken) -> AppResult<SnapshotReport> {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(databases.len());

        for database in databases {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            reports.push(self.snapshot_database(database, cancel).await?);
        }

        Ok(SnapshotReport {
            started_at,
            finished_at: Utc::now(),
            databases: reports,
        })
    }

    /// Snapshot one database: functions first, then tables with their mappings
    pub async fn snapshot_database(&self, database: &str, cancel: &CancellationToken) -> AppResult<DatabaseReport> {
        info!("Snapshotting database {}", database);

        let snapshot = {
            let client = self.provider.client_for(database)?;
            SchemaIntrospector::introspect(&client, database).await?
        };

        let db_dir = self.database_dir(database);
        let mut stats = StoreStats::default();

        let functions = ScriptStore::new(db_dir.join("Functions"));
        stats.merge(functions.write_all(&function_scripts(&snapshot), cancel).await?);

        let tables = ScriptStore::new(db_dir.join("Tables"));
        stats.merge(tables.write_all(&table_scripts(&snapshot), cancel).await?);

        let report = DatabaseReport {
            database: database.to_string(),
            output_dir: db_dir,
            tables: snapshot.schema.tables.len(),
            functions: snapshot.schema.functions.len(),
            mappings: snapshot.mapping_count(),
            files_written: stats.written,
            stale_removed: stats.stale_removed,
        };

        info!(
            "Database {}: {} tables, {} functions, {} mappings, {} files written, {} stale removed",
            database, report.tables, report.functions, report.mappings, report.files_written, report.stale_removed
        );

        Ok(report)
    }
}

/// One script per stored function
pub fn function_scripts(snapshot: &DatabaseSnapshot) -> Vec<ScriptFile> {
    snapshot
        .schema
        .functions
        .values()
        .map(|function| {
            ScriptFile::new(
                function.name.clone(),
                function.folder.clone(),
                ScriptGenerator::function_command(function),
            )
        })
        .collect()
}

/// One script per table, carrying the table's ingestion mappings
pub fn table_scripts(snapshot: &DatabaseSnapshot) -> Vec<ScriptFile> {
    snapshot
        .schema
        .tables
        .values()
        .map(|table| {
            let mappings = snapshot
                .mappings
                .get(&table.name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            ScriptFile::new(
                table.name.clone(),
                table.folder.clone(),
                ScriptGenerator::table_script(table, mappings),
            )
        })
        .collect()
}
