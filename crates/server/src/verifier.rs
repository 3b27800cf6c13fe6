//! Bearer-token verification against the pool's published signing keys.
//!
//! Keys rotate, so they are fetched from the provider's JWKS endpoint and
//! cached with a TTL. The cache is a single slot behind an `RwLock`; refresh
//! swaps the whole key set at once, so concurrent readers never observe a
//! partially-updated set. Every verification failure collapses into one
//! TOKEN_INVALID rejection; the failing check is only logged, never exposed.

use crate::config::ProviderConfig;
use crate::error::ServiceError;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::HS256,
];

/// Verified contents of a bearer token. Untrusted until
/// [`TokenVerifier::verify`] returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSet {
    pub sub: String,
    #[serde(alias = "cognito:username")]
    pub username: Option<String>,
    pub exp: i64,
    pub token_use: Option<String>,
    pub client_id: Option<String>,
    pub aud: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

struct CachedKeys {
    set: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Validates token signature, issuer, expiry, token-use, and client binding.
pub struct TokenVerifier {
    http: reqwest::Client,
    provider: ProviderConfig,
    keys: RwLock<Option<CachedKeys>>,
}

impl TokenVerifier {
    pub fn new(http: reqwest::Client, provider: ProviderConfig) -> Self {
        Self {
            http,
            provider,
            keys: RwLock::new(None),
        }
    }

    fn cached_set(&self) -> Option<Arc<JwkSet>> {
        let guard = self.keys.read().ok()?;
        let cached = guard.as_ref()?;
        let ttl = Duration::from_secs(self.provider.jwks_ttl_secs);
        if cached.fetched_at.elapsed() > ttl {
            return None;
        }
        Some(cached.set.clone())
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, reqwest::Error> {
        self.http
            .get(self.provider.jwks_url())
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await
    }

    /// Fetch the key set and swap it into the cache. The fetch is idempotent,
    /// so one retry on a network failure is allowed.
    async fn refresh_keys(&self) -> Result<Arc<JwkSet>, ServiceError> {
        let set = match self.fetch_jwks().await {
            Ok(set) => set,
            Err(first) => {
                tracing::warn!(error = %first, "JWKS fetch failed, retrying once");
                self.fetch_jwks().await.map_err(|e| {
                    tracing::warn!(error = %e, "JWKS fetch retry failed");
                    ServiceError::upstream_unavailable("Signing keys are unavailable")
                })?
            }
        };
        let set = Arc::new(set);
        if let Ok(mut guard) = self.keys.write() {
            *guard = Some(CachedKeys {
                set: set.clone(),
                fetched_at: Instant::now(),
            });
        }
        Ok(set)
    }

    /// Resolve the signing key for `kid`, re-fetching when the cache is stale
    /// or the key id is unknown (rotation).
    async fn key_for(&self, kid: &str) -> Result<Jwk, ServiceError> {
        if let Some(set) = self.cached_set()
            && let Some(jwk) = set.find(kid)
        {
            return Ok(jwk.clone());
        }
        let set = self.refresh_keys().await?;
        set.find(kid).cloned().ok_or_else(|| {
            tracing::debug!(kid, "token signed with unknown key id");
            invalid_token()
        })
    }

    /// Verify a bearer token, producing its claim set.
    ///
    /// Checks, in order: well-formed header with key id, known signing key,
    /// permitted algorithm matching the key, signature + issuer + expiry,
    /// expected token-use, and client/audience binding. Any failure yields
    /// the same TOKEN_INVALID rejection.
    #[tracing::instrument(skip(self, token))]
    pub async fn verify(&self, token: &str) -> Result<ClaimSet, ServiceError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "malformed token header");
            invalid_token()
        })?;
        let kid = header.kid.as_deref().ok_or_else(invalid_token)?;
        let jwk = self.key_for(kid).await?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            tracing::debug!(alg = ?header.alg, "token algorithm not permitted");
            return Err(invalid_token());
        }
        if let Some(key_alg) = &jwk.common.key_algorithm
            && key_alg.to_string() != format!("{:?}", header.alg)
        {
            tracing::debug!(alg = ?header.alg, key_alg = %key_alg, "algorithm does not match key");
            return Err(invalid_token());
        }

        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            tracing::debug!(error = %e, "unusable signing key");
            invalid_token()
        })?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.provider.issuer()]);
        validation.validate_exp = true;
        // Audience binding is checked manually below; access tokens carry a
        // `client_id` claim instead of `aud`.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<ClaimSet>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "token failed validation");
            invalid_token()
        })?;
        let claims = data.claims;

        match claims.token_use.as_deref() {
            Some(token_use) if token_use == self.provider.token_use => {}
            other => {
                tracing::debug!(token_use = ?other, "unexpected token use");
                return Err(invalid_token());
            }
        }

        let client_bound = match self.provider.token_use.as_str() {
            "id" => audience_contains(claims.aud.as_ref(), &self.provider.client_id),
            _ => claims.client_id.as_deref() == Some(self.provider.client_id.as_str()),
        };
        if !client_bound {
            tracing::debug!("token issued for a different client");
            return Err(invalid_token());
        }

        Ok(claims)
    }
}

fn invalid_token() -> ServiceError {
    ServiceError::token_invalid("Invalid or expired token")
}

fn audience_contains(aud: Option<&Value>, client_id: &str) -> bool {
    match aud {
        Some(Value::String(s)) => s == client_id,
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(client_id)),
        _ => false,
    }
}

fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// `exp == now` is still valid; only a strictly-past expiry counts.
pub fn is_expired_at(exp: i64, now: i64) -> bool {
    exp < now
}

pub fn is_expired(exp: i64) -> bool {
    is_expired_at(exp, now_epoch())
}

/// Seconds until expiry, clamped at zero.
pub fn remaining_seconds_at(exp: i64, now: i64) -> i64 {
    (exp - now).max(0)
}

pub fn remaining_seconds(exp: i64) -> i64 {
    remaining_seconds_at(exp, now_epoch())
}

/// Render an epoch-seconds expiry as an ISO-8601 timestamp. Out-of-range
/// values fall back to the raw number.
pub fn format_expiration(exp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(exp)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| exp.to_string())
}
