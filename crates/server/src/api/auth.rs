//! User-pool authentication endpoints.
//!
//! Every handler validates its input locally first (short-circuiting before
//! any network call), then maps to exactly one Identity Provider Gateway or
//! Token Verifier operation.

use crate::AppState;
use crate::error::{ErrorBody, ServiceError};
use crate::identity::{Identity, is_email_shaped, reject_if_email_shaped};
use crate::response::{MessageResponse, SessionResponse, TokenVerificationResponse};
use axum::{Json, extract::State};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const AUTH_TAG: &str = "Authentication";

pub fn router(state: AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(sign_up))
        .routes(routes!(verify_email))
        .routes(routes!(login))
        .routes(routes!(refresh_token))
        .routes(routes!(verify_token))
        .with_state(state)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub given_name: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    /// Email used at signup, or the explicit username.
    pub identifier: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub identifier: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
    /// The identifier used at the original login.
    pub identifier: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyTokenRequest {
    pub token: Option<String>,
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, ServiceError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ServiceError::validation(message)),
    }
}

/// Register a new user with the pool.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/signup",
    tag = AUTH_TAG,
    operation_id = "Sign Up",
    summary = "Register a new user",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Registration accepted, confirmation pending", body = MessageResponse),
        (status = 400, description = "Invalid input or provider rejection", body = ErrorBody),
        (status = 409, description = "Identity already registered", body = ErrorBody),
        (status = 502, description = "Identity provider unreachable", body = ErrorBody)
    )
)]
async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let email = required(
        &payload.email,
        "Missing required fields: email, password, given_name, phone",
    )?;
    let password = required(
        &payload.password,
        "Missing required fields: email, password, given_name, phone",
    )?;
    let given_name = required(
        &payload.given_name,
        "Missing required fields: email, password, given_name, phone",
    )?;
    let phone = required(
        &payload.phone,
        "Missing required fields: email, password, given_name, phone",
    )?;

    if !is_email_shaped(email) {
        return Err(ServiceError::validation("A valid email address is required"));
    }
    if let Some(username) = payload.username.as_deref() {
        reject_if_email_shaped(username)?;
    }

    let identity = Identity {
        email: Some(email.to_string()),
        username: payload.username.clone(),
        phone: Some(phone.to_string()),
        given_name: Some(given_name.to_string()),
        display_name: payload.name.clone(),
    };
    state.gateway.register(&identity, password).await?;

    Ok(Json(MessageResponse::new(
        "Successfully created. Please verify your email with the code sent.",
    )))
}

/// Confirm a registration with the emailed code.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/verify-email",
    tag = AUTH_TAG,
    operation_id = "Verify Email",
    summary = "Confirm a registration with the emailed code",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Missing input or invalid/expired code", body = ErrorBody),
        (status = 502, description = "Identity provider unreachable", body = ErrorBody)
    )
)]
async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let identifier = required(
        &payload.identifier,
        "Identifier and verification code are required",
    )?;
    let code = required(&payload.code, "Identifier and verification code are required")?;

    state.gateway.confirm_registration(identifier, code).await?;
    Ok(Json(MessageResponse::new(
        "Email verified successfully! You can now log in.",
    )))
}

/// Password login.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    summary = "Authenticate with identifier and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 400, description = "Missing input", body = ErrorBody),
        (status = 401, description = "Authentication failed", body = ErrorBody),
        (status = 502, description = "Identity provider unreachable", body = ErrorBody)
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let identifier = required(&payload.identifier, "Identifier and password are required")?;
    let password = match payload.password.as_deref() {
        // Passwords are not trimmed; whitespace can be significant.
        Some(p) if !p.is_empty() => p,
        _ => return Err(ServiceError::validation("Identifier and password are required")),
    };

    let bundle = state.gateway.authenticate(identifier, password).await?;
    Ok(Json(SessionResponse::from_bundle("Login successful", bundle)))
}

/// Mint fresh tokens from a refresh token.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/refresh",
    tag = AUTH_TAG,
    operation_id = "Refresh Token",
    summary = "Exchange a refresh token for fresh tokens",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = SessionResponse),
        (status = 400, description = "Missing input", body = ErrorBody),
        (status = 401, description = "Refresh rejected", body = ErrorBody),
        (status = 502, description = "Identity provider unreachable", body = ErrorBody)
    )
)]
async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let refresh_token = required(
        &payload.refresh_token,
        "Refresh token and identifier are required",
    )?;
    let identifier = required(
        &payload.identifier,
        "Refresh token and identifier are required",
    )?;

    let bundle = state.gateway.refresh(refresh_token, identifier).await?;
    Ok(Json(
        SessionResponse::from_bundle("Token refreshed successfully", bundle)
            .without_refresh_token(),
    ))
}

/// Verify a bearer token and echo its claims.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/verify-token",
    tag = AUTH_TAG,
    operation_id = "Verify Token",
    summary = "Verify an access token against the pool's signing keys",
    request_body = VerifyTokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = TokenVerificationResponse),
        (status = 400, description = "Missing input", body = ErrorBody),
        (status = 403, description = "Token rejected", body = ErrorBody),
        (status = 502, description = "Signing keys unavailable", body = ErrorBody)
    )
)]
async fn verify_token(
    State(state): State<AppState>,
    Json(payload): Json<VerifyTokenRequest>,
) -> Result<Json<TokenVerificationResponse>, ServiceError> {
    let token = required(&payload.token, "Token is required")?;
    let claims = state.verifier.verify(token).await?;
    Ok(Json(TokenVerificationResponse::from_claims(&claims)))
}
