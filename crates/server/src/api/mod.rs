//! HTTP layer.
//!
//! - `auth` - registration, confirmation, login, refresh, token verification
//! - `oauth` - third-party OAuth2 login and callback
//! - `health` - liveness probe
//! - `openapi` - OpenAPI document configuration

pub mod auth;
pub mod health;
pub mod oauth;
pub mod openapi;

pub use auth::AUTH_TAG;
pub use health::MISC_TAG;
pub use oauth::OAUTH_TAG;

use crate::AppState;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Assemble the full application router. Split out from serving so tests can
/// drive it in-process.
pub fn build_router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/auth", auth::router(state.clone()))
        .nest("/api/oauth", oauth::router(state.clone()))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: AppState) -> color_eyre::Result<()> {
    let bind_addr = state.config.bind_addr.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
