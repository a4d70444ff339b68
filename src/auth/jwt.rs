//! Client assertion tokens
//!
//! Certificate-based client credentials prove possession of the certificate's
//! private key by presenting a short-lived RS256 JWT instead of a secret.

use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

/// Client assertion lifetime (10 minutes)
const ASSERTION_EXPIRATION_MINUTES: i64 = 10;

/// Client assertion claims
#[derive(Debug, Serialize, Clone)]
pub struct AssertionClaims {
    /// Audience (the token endpoint)
    pub aud: String,
    /// Issuer (the application client id)
    pub iss: String,
    /// Subject (the application client id)
    pub sub: String,
    /// Unique token id
    pub jti: String,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(client_id: &str, token_url: &str) -> Self {
        let now = Utc::now();
        Self {
            aud: token_url.to_string(),
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ASSERTION_EXPIRATION_MINUTES)).timestamp(),
        }
    }
}

/// Parse a PEM-encoded RSA private key
pub fn load_private_key(pem: &[u8]) -> AppResult<EncodingKey> {
    EncodingKey::from_rsa_pem(pem)
        .map_err(|e| AppError::Config(format!("Invalid certificate private key: {}", e)))
}

/// Convert a hex certificate thumbprint into the `x5t` header value
pub fn thumbprint_to_x5t(thumbprint: &str) -> AppResult<String> {
    let hex: String = thumbprint
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if hex.is_empty() || hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Config(format!("Invalid certificate thumbprint '{}'", thumbprint)));
    }

    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| AppError::Config(format!("Invalid certificate thumbprint '{}'", thumbprint)))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Create a signed client assertion for the token endpoint
pub fn create_client_assertion(
    client_id: &str,
    token_url: &str,
    thumbprint: &str,
    key: &EncodingKey,
) -> AppResult<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.x5t = Some(thumbprint_to_x5t(thumbprint)?);

    let claims = AssertionClaims::new(client_id, token_url);

    encode(&header, &claims, key)
        .map_err(|e| AppError::Config(format!("Failed to sign client assertion: {}", e)))
}
