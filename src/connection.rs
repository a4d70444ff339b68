//! Cluster connection
//!
//! The snapshot core only needs one capability from a cluster: execute a
//! control command against a named database and get a table back. This module
//! defines that contract and implements it over the Kusto REST management
//! endpoint.

use crate::auth::{AuthConfig, TokenProvider};
use crate::error::{not_found_error, retrieval_error, AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Application name reported to the cluster
const APPLICATION_NAME: &str = "CloneKusto";

/// Per-request timeout for control commands
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Column of a result table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    pub name: String,
    pub data_type: String,
}

/// Primary result table of a control command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<DataColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    #[cfg(test)]
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// First cell of the first row, if any
    pub fn first_cell(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Executes control commands against a cluster database
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn execute_control_command(&self, database: &str, command: &str) -> AppResult<DataTable>;
}

/// Hands out a client scoped to one database
///
/// The client is owned by the caller and released when it goes out of scope.
pub trait ClientProvider: Send + Sync {
    type Client: ClusterClient;

    fn client_for(&self, database: &str) -> AppResult<Self::Client>;
}

/// Kusto v1 REST response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct V1Response {
    #[serde(default)]
    tables: Vec<V1Table>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct V1Table {
    #[serde(default)]
    table_name: String,
    #[serde(default)]
    columns: Vec<V1Column>,
    #[serde(default)]
    rows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct V1Column {
    column_name: String,
    #[serde(default)]
    data_type: String,
}

/// Decode the primary table of a v1 management response
pub fn parse_v1_response(body: &str) -> AppResult<DataTable> {
    let response: V1Response = serde_json::from_str(body)
        .map_err(|e| retrieval_error(format!("Malformed cluster response: {}", e)))?;

    let table = response
        .tables
        .into_iter()
        .next()
        .ok_or_else(|| retrieval_error("Cluster response contains no result table"))?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in table.rows {
        match row {
            Value::Array(cells) => rows.push(cells),
            Value::Object(ref obj) if obj.contains_key("Exceptions") => {
                let messages: Vec<String> = obj["Exceptions"]
                    .as_array()
                    .map(|e| e.iter().map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string())).collect())
                    .unwrap_or_default();
                return Err(retrieval_error(format!(
                    "Cluster reported errors: {}",
                    messages.join("; ")
                )));
            }
            other => {
                return Err(retrieval_error(format!("Unexpected result row: {}", other)));
            }
        }
    }

    Ok(DataTable {
        name: table.table_name,
        columns: table
            .columns
            .into_iter()
            .map(|c| DataColumn {
                name: c.column_name,
                data_type: c.data_type,
            })
            .collect(),
        rows,
    })
}

/// Turn a failed management response into the matching error kind
fn command_error(status: reqwest::StatusCode, body: &str, database: &str) -> AppError {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());

    let code = error
        .as_ref()
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message = error
        .as_ref()
        .and_then(|e| e.get("@message").or_else(|| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(500).collect());

    if code.contains("EntityNotFound") {
        not_found_error(format!("Database '{}': {}", database, message))
    } else {
        retrieval_error(format!("Control command failed ({}): {}", status, message))
    }
}

/// Kusto client bound to one database
pub struct KustoClient {
    endpoint: Url,
    database: String,
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

#[async_trait]
impl ClusterClient for KustoClient {
    async fn execute_control_command(&self, database: &str, command: &str) -> AppResult<DataTable> {
        let database = if database.is_empty() { self.database.as_str() } else { database };
        let token = self.tokens.access_token().await?;
        let request_id = format!("{};{}", APPLICATION_NAME, Uuid::new_v4());

        debug!("Executing control command on {} ({}): {}", database, request_id, command);

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header("x-ms-client-request-id", &request_id)
            .header("x-ms-app", APPLICATION_NAME)
            .json(&serde_json::json!({ "db": database, "csl": command }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(command_error(status, &body, database));
        }

        parse_v1_response(&body)
    }
}

/// Creates per-database Kusto clients sharing one HTTP pool and token cache
pub struct KustoClientProvider {
    endpoint: Url,
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

impl KustoClientProvider {
    pub fn new(cluster_uri: &Url, auth: AuthConfig) -> AppResult<Self> {
        let endpoint = cluster_uri
            .join("/v1/rest/mgmt")
            .map_err(|e| AppError::Config(format!("Invalid cluster URI: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let tokens = Arc::new(TokenProvider::new(http.clone(), auth, cluster_uri));

        Ok(Self {
            endpoint,
            http,
            tokens,
        })
    }
}

impl ClientProvider for KustoClientProvider {
    type Client = KustoClient;

    fn client_for(&self, database: &str) -> AppResult<KustoClient> {
        Ok(KustoClient {
            endpoint: self.endpoint.clone(),
            database: database.to_string(),
            http: self.http.clone(),
            tokens: Arc::clone(&self.tokens),
        })
    }
}
