//! Secret-hash computation for secret-hash client authentication.
//!
//! The provider requires `HMAC-SHA256(client_secret, identifier + client_id)`
//! on every call made on behalf of a user. The hash must cover the *exact*
//! identifier string transmitted in the same call; a trimmed-vs-untrimmed or
//! case mismatch is rejected upstream as a plain authentication failure.

use crate::config::ProviderConfig;
use crate::error::ServiceError;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64 secret hash binding `identifier` to the configured
/// client. Fails with CONFIG_ERROR when no client secret is configured.
pub fn compute_secret_hash(
    provider: &ProviderConfig,
    identifier: &str,
) -> Result<String, ServiceError> {
    let secret = provider
        .client_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ServiceError::config("A client secret must be configured to compute the secret hash")
        })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::config("Client secret is not a usable HMAC key"))?;
    mac.update(identifier.as_bytes());
    mac.update(provider.client_id.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}
