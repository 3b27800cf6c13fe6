use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Connection details for the managed user-pool identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub region: String,
    pub user_pool_id: String,
    pub client_id: String,
    /// Client secret for secret-hash client authentication. When unset,
    /// secret-hash computation fails with CONFIG_ERROR.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Override for the provider API endpoint. Defaults to the regional
    /// `cognito-idp` endpoint; tests point this at a mock server.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Expected `token_use` claim for verified tokens ("access" or "id").
    #[serde(default = "default_token_use")]
    pub token_use: String,
    /// How long fetched signing keys stay fresh before a re-fetch.
    #[serde(default = "default_jwks_ttl_secs")]
    pub jwks_ttl_secs: u64,
}

impl ProviderConfig {
    /// Base URL of the provider API.
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://cognito-idp.{}.amazonaws.com", self.region),
        }
    }

    /// Issuer expected in verified tokens: `{endpoint}/{user_pool_id}`.
    pub fn issuer(&self) -> String {
        format!("{}/{}", self.endpoint(), self.user_pool_id)
    }

    /// Published signing-key set for the pool.
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer())
    }
}

/// One third-party OAuth2 provider reachable through the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_oauth_scopes")]
    pub scopes: String,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    pub provider: ProviderConfig,
    /// OAuth providers keyed by the path segment used in /api/oauth/{name}.
    #[serde(default)]
    pub oauth: BTreeMap<String, OAuthProviderConfig>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_token_use() -> String {
    "access".to_string()
}

fn default_jwks_ttl_secs() -> u64 {
    3600
}

fn default_oauth_scopes() -> String {
    "openid email".to_string()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `PROVIDER__CLIENT_ID`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how
/// to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.provider.client_id.is_empty() {
        return Err(ConfigError::Validation(
            "provider.client_id must be set".into(),
        ));
    }
    if app.provider.user_pool_id.is_empty() {
        return Err(ConfigError::Validation(
            "provider.user_pool_id must be set".into(),
        ));
    }
    if app.provider.token_use != "access" && app.provider.token_use != "id" {
        return Err(ConfigError::Validation(
            "provider.token_use must be \"access\" or \"id\"".into(),
        ));
    }
    if app.provider.jwks_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "provider.jwks_ttl_secs must be > 0".into(),
        ));
    }
    for (name, oauth) in &app.oauth {
        if oauth.redirect_uri.is_empty() {
            return Err(ConfigError::Validation(format!(
                "oauth.{name}.redirect_uri must be set"
            )));
        }
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
