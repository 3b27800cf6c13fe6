//! REST gateway in front of a managed user-pool identity provider.
//!
//! The provider owns credentials, registration state, and token issuance;
//! this crate marshals HTTP requests into provider API calls, verifies
//! bearer tokens against the provider's published signing keys, and bridges
//! third-party OAuth2 logins into provider sessions.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::gateway::UserPoolGateway;
use crate::oauth::OAuthBridge;
use crate::verifier::TokenVerifier;

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod oauth;
pub mod response;
pub mod signer;
pub mod verifier;

/// Process-wide resources, constructed once at startup and injected into the
/// HTTP layer. The HTTP client is shared by every outbound call.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: UserPoolGateway,
    pub verifier: Arc<TokenVerifier>,
    pub bridge: OAuthBridge,
}

impl AppState {
    pub fn new(config: AppConfig, http: reqwest::Client) -> Self {
        let gateway = UserPoolGateway::new(http.clone(), config.provider.clone());
        let verifier = Arc::new(TokenVerifier::new(http.clone(), config.provider.clone()));
        let bridge = OAuthBridge::new(http, config.oauth.clone(), gateway.clone());
        Self {
            config: Arc::new(config),
            gateway,
            verifier,
            bridge,
        }
    }
}
