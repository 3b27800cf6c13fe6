//! Third-party OAuth2 login endpoints.

use crate::AppState;
use crate::error::{ErrorBody, ServiceError};
use crate::oauth::CallbackParams;
use crate::response::SessionResponse;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const OAUTH_TAG: &str = "OAuth";

pub fn router(state: AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(oauth_login))
        .routes(routes!(oauth_callback))
        .with_state(state)
}

/// Redirect the browser to the provider's authorization endpoint.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/{provider}/login",
    tag = OAUTH_TAG,
    operation_id = "OAuth Login",
    summary = "Start an OAuth2 login",
    params(
        ("provider" = String, Path, description = "Configured OAuth provider name, e.g. `google`."),
    ),
    responses(
        (status = 307, description = "Redirect to the provider authorization endpoint"),
        (status = 400, description = "Unknown provider", body = ErrorBody)
    )
)]
async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ServiceError> {
    let url = state.bridge.build_authorization_url(&provider)?;
    Ok(Redirect::temporary(url.as_str()))
}

/// Complete an OAuth2 login: exchange the code, fetch the profile, and mint
/// a user-pool session.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    get,
    path = "/{provider}/callback",
    tag = OAUTH_TAG,
    operation_id = "OAuth Callback",
    summary = "Handle the provider's authorization callback",
    params(
        ("provider" = String, Path, description = "Configured OAuth provider name."),
        ("code" = Option<String>, Query, description = "Authorization code."),
        ("error" = Option<String>, Query, description = "Provider error code, when the user denied access."),
        ("error_description" = Option<String>, Query, description = "Provider error detail."),
    ),
    responses(
        (status = 200, description = "Session created", body = SessionResponse),
        (status = 400, description = "Provider error or missing code", body = ErrorBody),
        (status = 401, description = "Exchange or user-info fetch rejected", body = ErrorBody),
        (status = 502, description = "Provider unreachable", body = ErrorBody)
    )
)]
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<SessionResponse>, ServiceError> {
    let bundle = state.bridge.handle_callback(&provider, &params).await?;
    Ok(Json(SessionResponse::from_bundle(
        "OAuth login successful",
        bundle,
    )))
}
