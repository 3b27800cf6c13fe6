//! OpenAPI/Utoipa configuration.

use crate::api::{auth::AUTH_TAG, health::MISC_TAG, oauth::OAUTH_TAG};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some(
                    "Access token minted by the identity provider via `/api/auth/login`.",
                ))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Identity Provider Gateway API",
        version = "1.0.0",
        description = "REST gateway for user-pool registration, login, token verification, and OAuth2 logins."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTH_TAG, description = "User-pool authentication endpoints"),
        (name = OAUTH_TAG, description = "Third-party OAuth2 login endpoints")
    )
)]
pub struct ApiDoc;
