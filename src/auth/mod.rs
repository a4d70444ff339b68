//! Authentication module
//!
//! Acquires Azure AD access tokens for the cluster with the OAuth2
//! client-credentials flow, using either a client secret or a certificate.

mod jwt;

pub use jwt::{create_client_assertion, load_private_key, thumbprint_to_x5t};

use crate::error::{retrieval_error, AppResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Azure AD authority host
const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_SKEW_MINUTES: i64 = 5;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Application credential
#[derive(Clone)]
pub enum Credential {
    Secret(String),
    Certificate { thumbprint: String, key: EncodingKey },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Secret(_) => write!(f, "Secret(****)"),
            Credential::Certificate { thumbprint, .. } => {
                write!(f, "Certificate {{ thumbprint: {} }}", thumbprint)
            }
        }
    }
}

/// Application identity used to authenticate against the cluster
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub tenant_id: String,
    pub credential: Credential,
}

impl AuthConfig {
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", AUTHORITY_HOST, self.tenant_id)
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until expiry; some endpoints send it as a string
    expires_in: Value,
}

impl TokenResponse {
    fn expires_in_seconds(&self) -> AppResult<i64> {
        let seconds = match &self.expires_in {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        seconds
            .filter(|s| *s > 0)
            .ok_or_else(|| retrieval_error(format!("Token response has an invalid expires_in: {}", self.expires_in)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::minutes(TOKEN_REFRESH_SKEW_MINUTES) > now
    }
}

/// Acquires and caches bearer tokens for one cluster
pub struct TokenProvider {
    http: reqwest::Client,
    auth: AuthConfig,
    scope: String,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, auth: AuthConfig, cluster_uri: &Url) -> Self {
        let scope = format!("{}/.default", cluster_uri.origin().ascii_serialization());
        Self {
            http,
            auth,
            scope,
            cache: RwLock::new(None),
        }
    }

    /// Get a valid access token, requesting a new one when the cached token is stale
    pub async fn access_token(&self) -> AppResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self) -> AppResult<CachedToken> {
        let token_url = self.auth.token_url();
        debug!("Requesting access token for scope {} from {}", self.scope, token_url);

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.auth.client_id.clone()),
            ("scope", self.scope.clone()),
        ];
        match &self.auth.credential {
            Credential::Secret(secret) => form.push(("client_secret", secret.clone())),
            Credential::Certificate { thumbprint, key } => {
                let assertion = create_client_assertion(&self.auth.client_id, &token_url, thumbprint, key)?;
                form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
                form.push(("client_assertion", assertion));
            }
        }

        let response = self.http.post(&token_url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err(retrieval_error(format!(
                "Azure AD token request failed ({}): {}",
                status, reason
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| retrieval_error(format!("Malformed Azure AD token response: {}", e)))?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in_seconds()?);
        debug!("Acquired access token valid until {}", expires_at);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}
