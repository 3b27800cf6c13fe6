//! Uniform error shape for everything that can fail between the HTTP layer
//! and the external identity / OAuth providers.
//!
//! All provider and network failures are normalized into [`ServiceError`] at
//! the gateway/bridge boundary; raw provider exception internals never reach
//! the caller.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Config,
    RegistrationFailed,
    VerificationFailed,
    AuthenticationFailed,
    RefreshFailed,
    TokenInvalid,
    OauthProviderError,
    MissingCode,
    TokenExchangeFailed,
    UserInfoFetchFailed,
    UpstreamUnavailable,
}

impl ErrorKind {
    /// The wire-level code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Config => "CONFIG_ERROR",
            ErrorKind::RegistrationFailed => "REGISTRATION_FAILED",
            ErrorKind::VerificationFailed => "VERIFICATION_FAILED",
            ErrorKind::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorKind::RefreshFailed => "REFRESH_FAILED",
            ErrorKind::TokenInvalid => "TOKEN_INVALID",
            ErrorKind::OauthProviderError => "OAUTH_PROVIDER_ERROR",
            ErrorKind::MissingCode => "MISSING_CODE",
            ErrorKind::TokenExchangeFailed => "TOKEN_EXCHANGE_FAILED",
            ErrorKind::UserInfoFetchFailed => "USER_INFO_FETCH_FAILED",
            ErrorKind::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
        }
    }

    /// Canonical HTTP status for the kind. Registration conflicts override
    /// this with 409 via [`ServiceError::registration_failed`].
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation
            | ErrorKind::RegistrationFailed
            | ErrorKind::VerificationFailed
            | ErrorKind::OauthProviderError
            | ErrorKind::MissingCode => StatusCode::BAD_REQUEST,
            ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::AuthenticationFailed
            | ErrorKind::RefreshFailed
            | ErrorKind::TokenExchangeFailed
            | ErrorKind::UserInfoFetchFailed => StatusCode::UNAUTHORIZED,
            ErrorKind::TokenInvalid => StatusCode::FORBIDDEN,
            ErrorKind::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Normalized failure carried from the service layer to the HTTP layer.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: StatusCode,
    /// Provider-specific code (e.g. `UsernameExistsException`), when known.
    pub provider_code: Option<String>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: kind.status(),
            provider_code: None,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Registration rejection. `conflict` marks a provider "already exists"
    /// signal, which maps to 409 instead of 400.
    pub fn registration_failed(message: impl Into<String>, conflict: bool) -> Self {
        let mut err = Self::new(ErrorKind::RegistrationFailed, message);
        if conflict {
            err.status = StatusCode::CONFLICT;
        }
        err
    }

    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VerificationFailed, message)
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationFailed, message)
    }

    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RefreshFailed, message)
    }

    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenInvalid, message)
    }

    pub fn oauth_provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OauthProviderError, message)
    }

    pub fn missing_code(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingCode, message)
    }

    pub fn token_exchange_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExchangeFailed, message)
    }

    pub fn user_info_fetch_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserInfoFetchFailed, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, message)
    }
}

/// JSON body returned for every failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description of the failure.
    pub message: String,
    /// Machine-readable error code.
    pub code: String,
    /// Provider-specific code, when the upstream reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_code: Option<String>,
    /// Present (and false) for token-verification failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let valid = matches!(self.kind, ErrorKind::TokenInvalid).then_some(false);
        let body = ErrorBody {
            message: self.message,
            code: self.kind.code().to_string(),
            provider_code: self.provider_code,
            valid,
        };
        (self.status, Json(body)).into_response()
    }
}
