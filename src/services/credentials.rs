use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ring::{rand::SystemRandom, signature};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::sheets::SheetError;

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Read credentials {}", path.display()))?;
        serde_json::from_str(&raw).map_err(|e| anyhow!("Invalid credentials JSON: {}", e))
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Service-account OAuth: signs an RS256 assertion and trades it for a bearer token.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    token: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey) -> Self {
        ServiceAccountAuth {
            key,
            token: Mutex::new(None),
        }
    }

    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String, SheetError> {
        let now = Utc::now();
        {
            let cached = self
                .token
                .lock()
                .map_err(|_| SheetError::Auth("Token lock".to_string()))?;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
                return Ok(token.value.clone());
            }
        }

        let assertion = signed_assertion(&self.key, now).map_err(|e| SheetError::Auth(e.to_string()))?;
        let response = client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SheetError::Auth(format!("Token endpoint {}: {}", status, body)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetError::Decode(e.to_string()))?;
        tracing::debug!(expires_in = body.expires_in, "Obtained spreadsheet access token");

        let token = CachedToken {
            value: body.access_token.clone(),
            expires_at: now + Duration::seconds(body.expires_in),
        };
        let mut cached = self
            .token
            .lock()
            .map_err(|_| SheetError::Auth("Token lock".to_string()))?;
        *cached = Some(token);
        Ok(body.access_token)
    }
}

fn signed_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let header = encode_segment(&JwtHeader {
        alg: "RS256",
        typ: "JWT",
    })?;
    let claims = encode_segment(&JwtClaims {
        iss: &key.client_email,
        scope: SPREADSHEETS_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    })?;
    let message = format!("{}.{}", header, claims);

    let der = pem_to_der(&key.private_key)?;
    let key_pair = signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow!("Invalid private key: {}", e))?;
    let rng = SystemRandom::new();
    let mut sig = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(&signature::RSA_PKCS1_SHA256, &rng, message.as_bytes(), &mut sig)
        .map_err(|_| anyhow!("Signing failed"))?;

    Ok(format!(
        "{}.{}",
        message,
        general_purpose::URL_SAFE_NO_PAD.encode(sig)
    ))
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(json))
}

fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    if body.is_empty() {
        return Err(anyhow!("Empty private key"));
    }
    general_purpose::STANDARD
        .decode(body)
        .map_err(|e| anyhow!("Decode private key: {}", e))
}
