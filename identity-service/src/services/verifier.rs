//! Bearer token verification against the provider's published signing keys.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::claims::{scope_authorities, ClaimShape, TokenClaims, RESOURCE_ACCESS_CLAIM, ROLES_KEY};
use crate::config::IdentityConfig;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token header has no key id")]
    MissingKeyId,

    #[error("No signing key with id {0}")]
    UnknownKey(String),

    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),

    #[error("Role claim contains a non-string entry")]
    MalformedRoles,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Check signature, expiry and issuer; return the claims on success.
    async fn verify(&self, token: &str) -> Result<TokenClaims, VerifyError>;
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct JwksVerifier {
    client: Client,
    jwks_uri: String,
    issuer: String,
    scope_prefix: String,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    cache: RwLock<Option<CachedKeys>>,
    /// Serializes refetches; holds the time of the last attempt.
    last_refresh: Mutex<Option<Instant>>,
}

impl JwksVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(config.provider.request_timeout())
            .build()
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        Ok(Self {
            client,
            jwks_uri: config.provider.jwks_uri(),
            issuer: config.provider.issuer(),
            scope_prefix: config.claims.scope_prefix.clone(),
            cache_ttl: config.jwks.cache_ttl(),
            min_refresh_interval: config.jwks.min_refresh_interval(),
            cache: RwLock::new(None),
            last_refresh: Mutex::new(None),
        })
    }

    /// Seed the key cache, e.g. with keys distributed out of band.
    #[must_use]
    pub fn with_key_set(self, keys: JwkSet) -> Self {
        Self {
            cache: RwLock::new(Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            })),
            ..self
        }
    }

    async fn cached_key(&self, kid: &str) -> Option<Jwk> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
            .and_then(|cached| cached.keys.find(kid).cloned())
    }

    async fn refresh_keys(&self) -> Result<(), VerifyError> {
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerifyError::KeyFetch(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        tracing::info!(
            jwks_uri = %self.jwks_uri,
            key_count = keys.keys.len(),
            "Refreshed provider signing keys"
        );

        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    /// Cached key if fresh, otherwise one refetch (covers key rotation).
    ///
    /// Refetches run one at a time and no closer together than the
    /// configured interval; a miss inside that window is `UnknownKey`.
    async fn key_for(&self, kid: &str) -> Result<Jwk, VerifyError> {
        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }

        let mut last_refresh = self.last_refresh.lock().await;

        // Another request may have refreshed while this one waited.
        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }

        if let Some(at) = *last_refresh {
            // An expired cache always refetches.
            if at.elapsed() < self.min_refresh_interval.min(self.cache_ttl) {
                tracing::debug!(kid = %kid, "Signing key unknown; refetch throttled");
                return Err(VerifyError::UnknownKey(kid.to_string()));
            }
        }

        *last_refresh = Some(Instant::now());
        self.refresh_keys().await?;
        drop(last_refresh);

        let cache = self.cache.read().await;
        cache
            .as_ref()
            .and_then(|cached| cached.keys.find(kid).cloned())
            .ok_or_else(|| VerifyError::UnknownKey(kid.to_string()))
    }
}

/// Signature algorithm a JWK is published for, if it names one.
fn published_algorithm(jwk: &Jwk) -> Result<Option<Algorithm>, VerifyError> {
    let Some(published) = jwk.common.key_algorithm.as_ref() else {
        return Ok(None);
    };

    let algorithm = match published {
        KeyAlgorithm::HS256 => Algorithm::HS256,
        KeyAlgorithm::HS384 => Algorithm::HS384,
        KeyAlgorithm::HS512 => Algorithm::HS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        // Encryption-only keys never sign bearer tokens.
        _ => return Err(VerifyError::InvalidToken(ErrorKind::InvalidAlgorithm.into())),
    };
    Ok(Some(algorithm))
}

/// Every entry under `resource_access.*.roles` must be a string.
fn check_roles(claims: &Map<String, Value>) -> Result<(), VerifyError> {
    let resources = match ClaimShape::of(claims.get(RESOURCE_ACCESS_CLAIM)) {
        ClaimShape::Object(resources) => resources,
        _ => return Ok(()),
    };

    let malformed = resources.values().any(|resource| {
        match ClaimShape::of(resource.get(ROLES_KEY)) {
            ClaimShape::Array(roles) => roles.iter().any(|role| !role.is_string()),
            _ => false,
        }
    });

    if malformed {
        return Err(VerifyError::MalformedRoles);
    }
    Ok(())
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, VerifyError> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;

        let jwk = self.key_for(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)?;

        let algorithm = published_algorithm(&jwk)?.unwrap_or(header.alg);
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_aud = false;

        let data = decode::<Map<String, Value>>(token, &key, &validation)?;
        check_roles(&data.claims)?;

        let scopes = scope_authorities(&data.claims, &self.scope_prefix);
        Ok(TokenClaims::new(data.claims).with_default_authorities(scopes))
    }
}
