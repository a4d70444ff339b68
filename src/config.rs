//! Application configuration module
//!
//! Resolves the run configuration from the command line, falling back to an
//! optional settings file and `CLONEKUSTO_*` environment variables (a `.env`
//! file is loaded first). Command-line values always win.

use crate::auth::{load_private_key, thumbprint_to_x5t, AuthConfig, Credential};
use crate::error::AppError;
use clap::Parser;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;
use validator::{Validate, ValidationError};

/// Settings file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "clonekusto";

/// Environment variable prefix for fallback settings
pub const ENV_PREFIX: &str = "CLONEKUSTO";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    #[error("Failed to read certificate key {}: {source}", path.display())]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Snapshot Kusto database schemas into a tree of .csl scripts
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "clone-kusto", version, about)]
pub struct Cli {
    /// Databases to snapshot, comma separated
    #[arg(short = 'd', long = "databases", value_delimiter = ',', required = true)]
    pub databases: Vec<String>,

    /// Output root directory (defaults to the current directory)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Cluster URI, e.g. https://mycluster.westeurope.kusto.windows.net
    #[arg(short = 'u', long = "clusteruri")]
    pub cluster_uri: Option<String>,

    /// Azure AD application (client) id
    #[arg(long = "auth-clientid")]
    pub client_id: Option<String>,

    /// Azure AD tenant id
    #[arg(long = "auth-tenantid")]
    pub tenant_id: Option<String>,

    /// Application client secret
    #[arg(long = "auth-clientsecret")]
    pub client_secret: Option<String>,

    /// Application certificate thumbprint (hex)
    #[arg(long = "auth-certthumbprint")]
    pub cert_thumbprint: Option<String>,

    /// PEM file with the certificate's RSA private key
    #[arg(long = "auth-certpath")]
    pub cert_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Settings file (toml, json or yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Fallback values from the settings file and environment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSettings {
    pub cluster_uri: Option<String>,
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_secret: Option<String>,
    pub cert_thumbprint: Option<String>,
    pub cert_path: Option<PathBuf>,
}

impl FileSettings {
    /// Load fallback settings
    ///
    /// An explicit `path` must exist; the default settings file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}

/// Merged, not yet validated connection options
#[derive(Debug, Validate)]
#[validate(schema(function = "validate_credentials"))]
struct ConnectionOptions {
    #[validate(
        length(min = 1, message = "At least one database is required"),
        custom(function = "validate_database_names")
    )]
    databases: Vec<String>,

    #[validate(
        required(message = "Cluster URI is required"),
        url(message = "Cluster URI is not a valid URL")
    )]
    cluster_uri: Option<String>,

    #[validate(required(message = "Client id is required"))]
    client_id: Option<String>,

    #[validate(required(message = "Tenant id is required"))]
    tenant_id: Option<String>,

    client_secret: Option<String>,
    cert_thumbprint: Option<String>,
    cert_path: Option<PathBuf>,
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_database_names(databases: &[String]) -> Result<(), ValidationError> {
    if databases.iter().any(|d| d.trim().is_empty()) {
        return Err(validation_error("database", "Database names must not be blank"));
    }
    // Names become a directory under `<output>/db`
    if databases
        .iter()
        .any(|d| d.contains(['/', '\\']) || d.contains("..") || d.trim() == ".")
    {
        return Err(validation_error(
            "database",
            "Database names must not contain path separators or '..'",
        ));
    }
    Ok(())
}

fn validate_credentials(options: &ConnectionOptions) -> Result<(), ValidationError> {
    match (&options.client_secret, &options.cert_thumbprint) {
        (Some(_), Some(_)) => Err(validation_error(
            "credentials",
            "Specify either a client secret or a certificate thumbprint, not both",
        )),
        (None, None) => Err(validation_error(
            "credentials",
            "A client secret or a certificate thumbprint is required",
        )),
        (None, Some(thumbprint)) => {
            if thumbprint_to_x5t(thumbprint).is_err() {
                return Err(validation_error(
                    "thumbprint",
                    "Certificate thumbprint must be an even-length hex string",
                ));
            }
            if options.cert_path.is_none() {
                return Err(validation_error(
                    "cert_path",
                    "A certificate thumbprint requires --auth-certpath with the PEM private key",
                ));
            }
            Ok(())
        }
        (Some(_), None) => Ok(()),
    }
}

/// Blank values count as not given
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fully resolved run configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub databases: Vec<String>,
    pub output_root: PathBuf,
    pub cluster_uri: Url,
    pub auth: AuthConfig,
}

impl Settings {
    /// Resolve settings from the command line plus file/environment fallbacks
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = FileSettings::load(cli.config.as_deref())?;
        Self::from_sources(cli, file)
    }

    /// Merge `cli` over `file` and validate the result
    pub fn from_sources(cli: Cli, file: FileSettings) -> Result<Self, ConfigError> {
        let options = ConnectionOptions {
            databases: cli.databases.iter().map(|d| d.trim().to_string()).collect(),
            cluster_uri: present(cli.cluster_uri).or_else(|| present(file.cluster_uri)),
            client_id: present(cli.client_id).or_else(|| present(file.client_id)),
            tenant_id: present(cli.tenant_id).or_else(|| present(file.tenant_id)),
            client_secret: present(cli.client_secret).or_else(|| present(file.client_secret)),
            cert_thumbprint: present(cli.cert_thumbprint).or_else(|| present(file.cert_thumbprint)),
            cert_path: cli.cert_path.or(file.cert_path),
        };

        options
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let cluster_uri = Self::parse_cluster_uri(options.cluster_uri.as_deref().unwrap_or_default())?;

        let credential = match (options.client_secret, options.cert_thumbprint, options.cert_path) {
            (Some(secret), _, _) => Credential::Secret(secret),
            (None, Some(thumbprint), Some(path)) => {
                let pem = std::fs::read(&path).map_err(|source| ConfigError::CertificateRead {
                    path: path.clone(),
                    source,
                })?;
                let key = load_private_key(&pem).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
                Credential::Certificate { thumbprint, key }
            }
            _ => {
                return Err(ConfigError::InvalidValue(
                    "No usable credential configured".to_string(),
                ))
            }
        };

        let output_root = match cli.output {
            Some(path) => path,
            None => std::env::current_dir().map_err(|e| {
                ConfigError::InvalidValue(format!("Cannot determine current directory: {}", e))
            })?,
        };

        Ok(Self {
            databases: options.databases,
            output_root,
            cluster_uri,
            auth: AuthConfig {
                client_id: options.client_id.unwrap_or_default(),
                tenant_id: options.tenant_id.unwrap_or_default(),
                credential,
            },
        })
    }

    fn parse_cluster_uri(uri: &str) -> Result<Url, ConfigError> {
        let parsed = Url::parse(uri)
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid cluster URI '{}': {}", uri, e)))?;

        match parsed.scheme() {
            "https" | "http" if parsed.host_str().is_some() => Ok(parsed),
            _ => Err(ConfigError::InvalidValue(format!(
                "Cluster URI must be an http(s) URL with a host, got '{}'",
                uri
            ))),
        }
    }
}
