//! OAuth Bridge: turns a third-party OAuth2 login into a user-pool session.
//!
//! Each callback runs one flow:
//! `Init -> Redirected -> CallbackReceived -> TokenExchanged -> UserFetched
//!  -> SessionCreated`, with any step able to divert to `Failed`. The bridge
//! only talks to the OAuth provider's token and user-info endpoints plus the
//! Identity Provider Gateway; it keeps no state between requests.

use crate::config::OAuthProviderConfig;
use crate::error::ServiceError;
use crate::gateway::{TokenBundle, UserPoolGateway};
use crate::identity::Identity;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use url::Url;

/// Progress of one external login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Init,
    Redirected,
    CallbackReceived,
    TokenExchanged,
    UserFetched,
    SessionCreated,
    Failed,
}

/// Query parameters the OAuth provider sends to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Token response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Profile returned by the provider's user-info endpoint.
#[derive(Debug, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct OAuthBridge {
    http: reqwest::Client,
    providers: BTreeMap<String, OAuthProviderConfig>,
    gateway: UserPoolGateway,
}

impl OAuthBridge {
    pub fn new(
        http: reqwest::Client,
        providers: BTreeMap<String, OAuthProviderConfig>,
        gateway: UserPoolGateway,
    ) -> Self {
        Self {
            http,
            providers,
            gateway,
        }
    }

    fn provider(&self, name: &str) -> Result<&OAuthProviderConfig, ServiceError> {
        self.providers
            .get(name)
            .ok_or_else(|| ServiceError::validation(format!("Unknown OAuth provider: {name}")))
    }

    /// Construct the provider authorization URL. Pure: no I/O, deterministic
    /// for a given configuration.
    pub fn build_authorization_url(&self, name: &str) -> Result<Url, ServiceError> {
        let cfg = self.provider(name)?;
        let mut url = Url::parse(&cfg.authorize_url).map_err(|e| {
            ServiceError::config(format!("Invalid authorize_url for {name}: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &cfg.client_id)
            .append_pair("redirect_uri", &cfg.redirect_uri)
            .append_pair("scope", &cfg.scopes);
        Ok(url)
    }

    /// Exchange an authorization code at the provider's token endpoint using
    /// the configured client credentials.
    #[tracing::instrument(skip(self, code))]
    pub async fn exchange_code_for_tokens(
        &self,
        name: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, ServiceError> {
        let cfg = self.provider(name)?;
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", cfg.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let response = self
            .http
            .post(&cfg.token_url)
            .basic_auth(&cfg.client_id, Some(&cfg.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "OAuth token endpoint unreachable");
                ServiceError::upstream_unavailable("OAuth provider is unavailable")
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::token_exchange_failed(format!(
                "Token exchange failed: {body}"
            )));
        }
        response.json::<OAuthTokens>().await.map_err(|e| {
            tracing::warn!(error = %e, "unparseable token response");
            ServiceError::token_exchange_failed("Token exchange returned an invalid response")
        })
    }

    /// Fetch the external user's profile with the bearer token from the
    /// exchange step.
    #[tracing::instrument(skip(self, access_token))]
    pub async fn fetch_user_info(
        &self,
        name: &str,
        access_token: &str,
    ) -> Result<UserProfile, ServiceError> {
        let cfg = self.provider(name)?;
        let response = self
            .http
            .get(&cfg.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "OAuth user-info endpoint unreachable");
                ServiceError::upstream_unavailable("OAuth provider is unavailable")
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::user_info_fetch_failed(format!(
                "Failed to get user info: {body}"
            )));
        }
        response.json::<UserProfile>().await.map_err(|e| {
            tracing::warn!(error = %e, "unparseable user-info response");
            ServiceError::user_info_fetch_failed("User info response was not valid JSON")
        })
    }

    /// Map an external identity onto a user-pool session.
    ///
    /// Idempotent: creation is skipped (an "already exists" rejection is
    /// tolerated) when the user was materialized by an earlier login. The
    /// federated account's credential is derived, not stored, so the same
    /// external email always authenticates with the same value.
    #[tracing::instrument(skip(self, external_name))]
    pub async fn materialize_local_session(
        &self,
        external_email: &str,
        external_name: Option<&str>,
        provider: &str,
    ) -> Result<TokenBundle, ServiceError> {
        let email = external_email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ServiceError::user_info_fetch_failed(
                "OAuth profile did not include an email address",
            ));
        }
        let credential = self.federated_credential(provider, &email)?;

        let identity = Identity {
            email: Some(email.clone()),
            display_name: external_name.map(String::from),
            ..Default::default()
        };
        match self.gateway.register(&identity, &credential).await {
            Ok(_) => {
                tracing::info!(provider, "materialized new federated user");
            }
            Err(e) if e.status == axum::http::StatusCode::CONFLICT => {
                tracing::debug!(provider, "federated user already exists");
            }
            Err(e) => return Err(e),
        }

        self.gateway.authenticate(&email, &credential).await
    }

    /// Drive a callback through the whole flow, returning the minted session.
    #[tracing::instrument(skip(self, params))]
    pub async fn handle_callback(
        &self,
        name: &str,
        params: &CallbackParams,
    ) -> Result<TokenBundle, ServiceError> {
        // Redirect already happened on the provider side by the time the
        // callback fires.
        let mut state = FlowState::CallbackReceived;
        let result = self.run_callback(name, params, &mut state).await;
        match &result {
            Ok(_) => debug_transition(name, state),
            Err(e) => {
                state = FlowState::Failed;
                tracing::debug!(provider = name, ?state, code = e.kind.code(), "flow failed");
            }
        }
        result
    }

    async fn run_callback(
        &self,
        name: &str,
        params: &CallbackParams,
        state: &mut FlowState,
    ) -> Result<TokenBundle, ServiceError> {
        let cfg = self.provider(name)?;
        if let Some(error) = params.error.as_deref() {
            let message = match params.error_description.as_deref() {
                Some(description) => format!("{error}: {description}"),
                None => error.to_string(),
            };
            return Err(ServiceError::oauth_provider(message));
        }
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::missing_code("Authorization code is missing"))?;

        let redirect_uri = cfg.redirect_uri.clone();
        let tokens = self
            .exchange_code_for_tokens(name, code, &redirect_uri)
            .await?;
        *state = FlowState::TokenExchanged;
        debug_transition(name, *state);

        let profile = self.fetch_user_info(name, &tokens.access_token).await?;
        *state = FlowState::UserFetched;
        debug_transition(name, *state);

        let bundle = self
            .materialize_local_session(
                profile.email.as_deref().unwrap_or_default(),
                profile.name.as_deref(),
                name,
            )
            .await?;
        *state = FlowState::SessionCreated;
        Ok(bundle)
    }

    /// Deterministic credential for a federated account, keyed by the pool
    /// client secret. The fixed suffix satisfies common password policies.
    fn federated_credential(&self, provider: &str, email: &str) -> Result<String, ServiceError> {
        let secret = self
            .gateway
            .provider()
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ServiceError::config(
                    "A client secret must be configured to derive federated credentials",
                )
            })?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| ServiceError::config("Client secret is not a usable HMAC key"))?;
        mac.update(b"federated:");
        mac.update(provider.as_bytes());
        mac.update(b":");
        mac.update(email.as_bytes());
        let digest = mac.finalize().into_bytes();
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
        Ok(format!("{encoded}Aa1!"))
    }
}

fn debug_transition(provider: &str, state: FlowState) {
    tracing::debug!(provider, ?state, "oauth flow transition");
}
