//! Response shapes exposed by the HTTP layer.
//!
//! The Session Response Builder lives here: provider token bundles and
//! verified claim sets are reshaped into the external API contract.

use crate::gateway::TokenBundle;
use crate::verifier::{ClaimSet, format_expiration, is_expired, remaining_seconds};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plain confirmation message (signup, email verification).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Token bundle shaped for the login/refresh/oauth-callback responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub message: String,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
}

impl SessionResponse {
    pub fn from_bundle(message: impl Into<String>, bundle: TokenBundle) -> Self {
        Self {
            message: message.into(),
            access_token: bundle.access_token,
            id_token: bundle.id_token,
            refresh_token: bundle.refresh_token,
            token_type: bundle.token_type,
            expires_in: bundle.expires_in,
        }
    }

    /// Refresh responses never echo a refresh token; the provider does not
    /// rotate it on refresh.
    pub fn without_refresh_token(mut self) -> Self {
        self.refresh_token = None;
        self
    }
}

/// Result of a successful token verification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenVerificationResponse {
    pub message: String,
    pub valid: bool,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub expires_at: i64,
    pub expires_at_formatted: String,
    pub is_expired: bool,
    pub remaining_seconds: i64,
}

impl TokenVerificationResponse {
    pub fn from_claims(claims: &ClaimSet) -> Self {
        Self {
            message: "Token is valid".to_string(),
            valid: true,
            user_id: claims.sub.clone(),
            user_name: claims.username.clone(),
            expires_at: claims.exp,
            expires_at_formatted: format_expiration(claims.exp),
            is_expired: is_expired(claims.exp),
            remaining_seconds: remaining_seconds(claims.exp),
        }
    }
}
