//! Identity Provider Gateway.
//!
//! Thin, uniformly-wrapped calls against the user pool's JSON API
//! (`x-amz-json-1.1` with an `X-Amz-Target` operation header). The provider
//! owns credential storage and token issuance; this module only marshals
//! requests and normalizes provider rejections into [`ServiceError`].

use crate::config::ProviderConfig;
use crate::error::ServiceError;
use crate::identity::{Identity, derive_provider_username, normalize_phone};
use crate::signer::compute_secret_hash;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use utoipa::ToSchema;

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";
const FLOW_USER_PASSWORD: &str = "USER_PASSWORD_AUTH";
const FLOW_REFRESH_TOKEN: &str = "REFRESH_TOKEN_AUTH";

/// Tokens minted by a successful authentication or refresh. Never persisted
/// server-side; bearer tokens are re-verified per request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenBundle {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
}

/// Outcome of a registration call.
#[derive(Debug, Clone)]
pub struct Registration {
    /// The derived username actually stored by the provider. Recomputed (not
    /// stored) at confirmation time.
    pub provider_username: String,
    pub user_confirmed: bool,
}

/// What went wrong during a provider call, before the per-operation error
/// mapping is applied.
enum CallFailure {
    /// The provider rejected the request and named a reason.
    Rejected {
        code: Option<String>,
        message: Option<String>,
    },
    /// The provider could not be reached or answered garbage.
    Transport(String),
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AttributeType {
    name: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpRequest {
    client_id: String,
    username: String,
    password: String,
    secret_hash: String,
    user_attributes: Vec<AttributeType>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct SignUpResponse {
    user_confirmed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfirmSignUpRequest {
    client_id: String,
    username: String,
    confirmation_code: String,
    secret_hash: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ConfirmSignUpResponse {}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest {
    client_id: String,
    auth_flow: String,
    auth_parameters: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct AuthenticationResult {
    access_token: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ProviderErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Gateway over the four user-pool operations. Constructed once at startup
/// with a shared HTTP client; holds no per-request state.
#[derive(Clone)]
pub struct UserPoolGateway {
    http: reqwest::Client,
    provider: ProviderConfig,
}

impl UserPoolGateway {
    pub fn new(http: reqwest::Client, provider: ProviderConfig) -> Self {
        Self { http, provider }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, CallFailure>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/", self.provider.endpoint()))
            .header("content-type", "application/x-amz-json-1.1")
            .header("x-amz-target", format!("{TARGET_PREFIX}.{operation}"))
            .json(request)
            .send()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| CallFailure::Transport(format!("Invalid provider response: {e}")));
        }

        let body: ProviderErrorBody = response.json().await.unwrap_or_default();
        // The error type arrives namespaced ("com.amazon...#CodeMismatchException").
        let code = body
            .error_type
            .map(|t| t.rsplit('#').next().unwrap_or(&t).to_string());
        tracing::debug!(operation, status = %status, code = ?code, "provider rejected request");
        Err(CallFailure::Rejected {
            code,
            message: body.message,
        })
    }

    /// Register a new user. The identifier the provider stores is the
    /// derived provider username; the email (and phone) ride along as
    /// attributes so they can act as sign-in aliases.
    #[tracing::instrument(skip(self, identity, password))]
    pub async fn register(
        &self,
        identity: &Identity,
        password: &str,
    ) -> Result<Registration, ServiceError> {
        let username = derive_provider_username(identity)?;
        let secret_hash = compute_secret_hash(&self.provider, &username)?;

        let mut user_attributes = Vec::new();
        if let Some(email) = identity.email.as_deref() {
            user_attributes.push(AttributeType {
                name: "email".into(),
                value: email.trim().to_string(),
            });
        }
        if let Some(name) = identity.display_name.as_deref() {
            user_attributes.push(AttributeType {
                name: "name".into(),
                value: name.to_string(),
            });
        }
        if let Some(given_name) = identity.given_name.as_deref() {
            user_attributes.push(AttributeType {
                name: "given_name".into(),
                value: given_name.to_string(),
            });
        }
        if let Some(phone) = identity.phone.as_deref() {
            user_attributes.push(AttributeType {
                name: "phone_number".into(),
                value: normalize_phone(phone),
            });
        }

        let request = SignUpRequest {
            client_id: self.provider.client_id.clone(),
            username: username.clone(),
            password: password.to_string(),
            secret_hash,
            user_attributes,
        };

        let response: SignUpResponse =
            self.call("SignUp", &request)
                .await
                .map_err(|failure| match failure {
                    CallFailure::Rejected { code, message } => {
                        let conflict = matches!(
                            code.as_deref(),
                            Some("UsernameExistsException") | Some("AliasExistsException")
                        );
                        let mut err = ServiceError::registration_failed(
                            message.unwrap_or_else(|| "Signup failed".into()),
                            conflict,
                        );
                        if let Some(code) = code {
                            err = err.with_provider_code(code);
                        }
                        err
                    }
                    CallFailure::Transport(detail) => transport_error(detail),
                })?;

        Ok(Registration {
            provider_username: username,
            user_confirmed: response.user_confirmed,
        })
    }

    /// Submit the emailed confirmation code. Re-derives the exact
    /// ProviderUsername/SecretHash pair used at registration.
    #[tracing::instrument(skip(self, code))]
    pub async fn confirm_registration(
        &self,
        identifier: &str,
        code: &str,
    ) -> Result<(), ServiceError> {
        let username = registration_username(identifier)?;
        let secret_hash = compute_secret_hash(&self.provider, &username)?;

        let request = ConfirmSignUpRequest {
            client_id: self.provider.client_id.clone(),
            username,
            confirmation_code: code.to_string(),
            secret_hash,
        };

        let _: ConfirmSignUpResponse = self
            .call("ConfirmSignUp", &request)
            .await
            .map_err(|failure| match failure {
                CallFailure::Rejected { code, message } => {
                    let mut err = ServiceError::verification_failed(
                        message.unwrap_or_else(|| "Verification failed".into()),
                    );
                    if let Some(code) = code {
                        err = err.with_provider_code(code);
                    }
                    err
                }
                CallFailure::Transport(detail) => transport_error(detail),
            })?;
        Ok(())
    }

    /// Password authentication. The identifier (email alias or username) is
    /// sent verbatim and the secret hash covers that exact string. Failures
    /// collapse into one generic message so callers can never tell whether
    /// the identifier or the password was wrong.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<TokenBundle, ServiceError> {
        let secret_hash = compute_secret_hash(&self.provider, identifier)?;
        let mut auth_parameters = BTreeMap::new();
        auth_parameters.insert("USERNAME".to_string(), identifier.to_string());
        auth_parameters.insert("PASSWORD".to_string(), password.to_string());
        auth_parameters.insert("SECRET_HASH".to_string(), secret_hash);

        let request = InitiateAuthRequest {
            client_id: self.provider.client_id.clone(),
            auth_flow: FLOW_USER_PASSWORD.to_string(),
            auth_parameters,
        };

        let response: InitiateAuthResponse =
            self.call("InitiateAuth", &request)
                .await
                .map_err(|failure| match failure {
                    CallFailure::Rejected { code, .. } => {
                        let mut err =
                            ServiceError::authentication_failed("Incorrect username or password");
                        if let Some(code) = code {
                            err = err.with_provider_code(code);
                        }
                        err
                    }
                    CallFailure::Transport(detail) => transport_error(detail),
                })?;

        into_token_bundle(response)
            .ok_or_else(|| ServiceError::authentication_failed("Incorrect username or password"))
    }

    /// Refresh-token authentication, bound to the identifier used at the
    /// original login (the secret hash must match).
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        identifier: &str,
    ) -> Result<TokenBundle, ServiceError> {
        let secret_hash = compute_secret_hash(&self.provider, identifier)?;
        let mut auth_parameters = BTreeMap::new();
        auth_parameters.insert("REFRESH_TOKEN".to_string(), refresh_token.to_string());
        auth_parameters.insert("USERNAME".to_string(), identifier.to_string());
        auth_parameters.insert("SECRET_HASH".to_string(), secret_hash);

        let request = InitiateAuthRequest {
            client_id: self.provider.client_id.clone(),
            auth_flow: FLOW_REFRESH_TOKEN.to_string(),
            auth_parameters,
        };

        let response: InitiateAuthResponse =
            self.call("InitiateAuth", &request)
                .await
                .map_err(|failure| match failure {
                    CallFailure::Rejected { code, .. } => {
                        let mut err =
                            ServiceError::refresh_failed("Unable to refresh the token");
                        if let Some(code) = code {
                            err = err.with_provider_code(code);
                        }
                        err
                    }
                    CallFailure::Transport(detail) => transport_error(detail),
                })?;

        into_token_bundle(response)
            .ok_or_else(|| ServiceError::refresh_failed("Unable to refresh the token"))
    }
}

/// The username sent at confirmation time: email-shaped identifiers go
/// through the same derivation used at registration, anything else is taken
/// as an explicit username.
fn registration_username(identifier: &str) -> Result<String, ServiceError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(ServiceError::validation("An identifier is required"));
    }
    if crate::identity::is_email_shaped(identifier) {
        Ok(crate::identity::username_from_email(identifier))
    } else {
        Ok(identifier.to_string())
    }
}

fn transport_error(detail: String) -> ServiceError {
    tracing::warn!(detail, "identity provider unreachable");
    ServiceError::upstream_unavailable("Identity provider is unavailable")
}

fn into_token_bundle(response: InitiateAuthResponse) -> Option<TokenBundle> {
    if let Some(challenge) = response.challenge_name {
        // Challenge flows (MFA, forced password reset) are not part of this
        // surface; callers see a plain authentication failure.
        tracing::debug!(challenge, "provider returned an auth challenge");
        return None;
    }
    let result = response.authentication_result?;
    Some(TokenBundle {
        access_token: result.access_token?,
        id_token: result.id_token,
        refresh_token: result.refresh_token,
        token_type: result.token_type.unwrap_or_else(|| "Bearer".into()),
        expires_in: result.expires_in.unwrap_or(3600),
    })
}
