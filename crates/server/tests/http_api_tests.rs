//! End-to-end handler tests over the assembled router.

use axum::http::StatusCode;
use axum_test::TestServer;
use idp_gateway::AppState;
use idp_gateway::api::build_router;
use idp_gateway::config::{AppConfig, OAuthProviderConfig, ProviderConfig};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Endpoint that nothing listens on, so any unexpected outbound call fails
/// as UPSTREAM_UNAVAILABLE instead of silently succeeding.
const DEAD_ENDPOINT: &str = "http://127.0.0.1:9";

fn app_config(pool_endpoint: &str) -> AppConfig {
    let mut oauth = BTreeMap::new();
    oauth.insert(
        "google".to_string(),
        OAuthProviderConfig {
            authorize_url: "https://accounts.example.com/oauth2/authorize".into(),
            token_url: format!("{DEAD_ENDPOINT}/oauth2/token"),
            userinfo_url: format!("{DEAD_ENDPOINT}/oauth2/userInfo"),
            client_id: "oauth-client".into(),
            client_secret: "oauth-secret".into(),
            redirect_uri: "http://localhost:3001/api/oauth/google/callback".into(),
            scopes: "openid email".into(),
        },
    );
    AppConfig {
        bind_addr: "127.0.0.1:0".into(),
        provider: ProviderConfig {
            region: "eu-central-1".into(),
            user_pool_id: "eu-central-1_TestPool".into(),
            client_id: "test-client".into(),
            client_secret: Some("test-secret".into()),
            endpoint: Some(pool_endpoint.to_string()),
            token_use: "access".into(),
            jwks_ttl_secs: 3600,
        },
        oauth,
    }
}

fn server(pool_endpoint: &str) -> TestServer {
    let state = AppState::new(app_config(pool_endpoint), reqwest::Client::new());
    TestServer::new(build_router(state)).expect("test server")
}

#[tokio::test]
async fn healthz_responds_ok() {
    let server = server(DEAD_ENDPOINT);
    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn signup_with_missing_fields_short_circuits() {
    // The dead endpoint proves no network call happened: reaching the
    // provider would have produced a 502 instead.
    let server = server(DEAD_ENDPOINT);
    let response = server
        .post("/api/auth/signup")
        .json(&json!({"email": "a@b.com", "password": "Secret1"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn signup_rejects_malformed_email_locally() {
    let server = server(DEAD_ENDPOINT);
    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "email": "not-an-email",
            "password": "Secret1",
            "given_name": "A",
            "phone": "555-123-4567"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn signup_rejects_email_shaped_username_before_any_network_call() {
    let server = server(DEAD_ENDPOINT);
    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "email": "a@b.com",
            "password": "Secret1",
            "given_name": "A",
            "phone": "555-123-4567",
            "username": "alice@b.com"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn signup_against_mock_pool_reports_confirmation_pending() {
    let pool = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header(
            "x-amz-target",
            "AWSCognitoIdentityProviderService.SignUp",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"UserConfirmed": false})))
        .expect(1)
        .mount(&pool)
        .await;

    let server = server(&pool.uri());
    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "email": "a@b.com",
            "password": "Secret1",
            "given_name": "A",
            "phone": "555-123-4567"
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>()["message"],
        "Successfully created. Please verify your email with the code sent."
    );
}

#[tokio::test]
async fn login_failure_is_generic_401() {
    let pool = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "NotAuthorizedException",
            "message": "Incorrect username or password."
        })))
        .mount(&pool)
        .await;

    let server = server(&pool.uri());
    let response = server
        .post("/api/auth/login")
        .json(&json!({"identifier": "a@b.com", "password": "wrong"}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUTHENTICATION_FAILED");
    assert_eq!(body["message"], "Incorrect username or password");
}

#[tokio::test]
async fn login_success_returns_session_shape() {
    let pool = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AuthenticationResult": {
                "AccessToken": "access",
                "IdToken": "id",
                "RefreshToken": "refresh",
                "TokenType": "Bearer",
                "ExpiresIn": 3600
            }
        })))
        .mount(&pool)
        .await;

    let server = server(&pool.uri());
    let response = server
        .post("/api/auth/login")
        .json(&json!({"identifier": "a@b.com", "password": "Secret1"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["access_token"], "access");
    assert_eq!(body["refresh_token"], "refresh");
    assert_eq!(body["expires_in"], 3600);
}

#[tokio::test]
async fn refresh_response_omits_refresh_token() {
    let pool = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AuthenticationResult": {
                "AccessToken": "fresh-access",
                "IdToken": "fresh-id",
                "TokenType": "Bearer",
                "ExpiresIn": 3600
            }
        })))
        .mount(&pool)
        .await;

    let server = server(&pool.uri());
    let response = server
        .post("/api/auth/refresh")
        .json(&json!({"refresh_token": "rt", "identifier": "a@b.com"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Token refreshed successfully");
    assert_eq!(body["access_token"], "fresh-access");
    assert!(body.get("refresh_token").is_none());
}

#[tokio::test]
async fn verify_token_requires_a_token() {
    let server = server(DEAD_ENDPOINT);
    let response = server.post("/api/auth/verify-token").json(&json!({})).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_token_is_403_with_no_claim_data() {
    let server = server(DEAD_ENDPOINT);
    let response = server
        .post("/api/auth/verify-token")
        .json(&json!({"token": "not-a-jwt"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "TOKEN_INVALID");
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "Invalid or expired token");
    assert!(body.get("user_id").is_none());
    assert!(body.get("expires_at").is_none());
}

#[tokio::test]
async fn oauth_login_redirects_to_the_authorization_endpoint() {
    let server = server(DEAD_ENDPOINT);
    let response = server.get("/api/oauth/google/login").await;

    response.assert_status(StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(location.starts_with("https://accounts.example.com/oauth2/authorize?"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("client_id=oauth-client"));
}

#[tokio::test]
async fn oauth_login_for_unknown_provider_is_400() {
    let server = server(DEAD_ENDPOINT);
    let response = server.get("/api/oauth/myspace/login").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oauth_callback_with_provider_error_is_400() {
    let server = server(DEAD_ENDPOINT);
    let response = server
        .get("/api/oauth/google/callback")
        .add_query_param("error", "access_denied")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "OAUTH_PROVIDER_ERROR");
    assert!(body["message"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn oauth_callback_without_code_is_missing_code() {
    let server = server(DEAD_ENDPOINT);
    let response = server.get("/api/oauth/google/callback").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "MISSING_CODE");
}
