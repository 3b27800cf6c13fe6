//! Identity Provider Gateway tests against a mocked user-pool API.

use idp_gateway::config::ProviderConfig;
use idp_gateway::gateway::UserPoolGateway;
use idp_gateway::identity::{Identity, is_email_shaped};
use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_config(endpoint: &str) -> ProviderConfig {
    ProviderConfig {
        region: "eu-central-1".into(),
        user_pool_id: "eu-central-1_TestPool".into(),
        client_id: "test-client".into(),
        client_secret: Some("test-secret".into()),
        endpoint: Some(endpoint.to_string()),
        token_use: "access".into(),
        jwks_ttl_secs: 3600,
    }
}

fn gateway(endpoint: &str) -> UserPoolGateway {
    UserPoolGateway::new(reqwest::Client::new(), provider_config(endpoint))
}

fn identity(email: &str) -> Identity {
    Identity {
        email: Some(email.into()),
        phone: Some("555-123-4567".into()),
        given_name: Some("A".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn register_derives_username_and_normalizes_phone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header(
            "x-amz-target",
            "AWSCognitoIdentityProviderService.SignUp",
        ))
        .and(body_string_contains("+5551234567"))
        .and(body_string_contains("usr_"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "UserConfirmed": false,
            "UserSub": "f6c1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registration = gateway(&server.uri())
        .register(&identity("a@b.com"), "Secret1")
        .await
        .expect("registration should succeed");

    assert!(registration.provider_username.starts_with("usr_"));
    assert!(!is_email_shaped(&registration.provider_username));
    assert!(!registration.user_confirmed);
}

#[tokio::test]
async fn duplicate_registration_maps_to_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "com.amazonaws.cognito#UsernameExistsException",
            "message": "An account with the given email already exists."
        })))
        .mount(&server)
        .await;

    let err = gateway(&server.uri())
        .register(&identity("a@b.com"), "Secret1")
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.kind.code(), "REGISTRATION_FAILED");
    assert_eq!(
        err.provider_code.as_deref(),
        Some("UsernameExistsException")
    );
}

#[tokio::test]
async fn weak_password_registration_stays_a_400() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "InvalidPasswordException",
            "message": "Password did not conform with policy"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server.uri())
        .register(&identity("a@b.com"), "weak")
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert!(err.message.contains("policy"));
}

#[tokio::test]
async fn registration_and_confirmation_reuse_identical_username_and_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let gw = gateway(&server.uri());
    gw.register(&identity("Round.Trip@Example.com"), "Secret1")
        .await
        .expect("register");
    gw.confirm_registration("Round.Trip@Example.com", "123456")
        .await
        .expect("confirm");

    let requests = server.received_requests().await.expect("recorded requests");
    assert_eq!(requests.len(), 2);
    let sign_up: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let confirm: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(sign_up["Username"], confirm["Username"]);
    assert_eq!(sign_up["SecretHash"], confirm["SecretHash"]);
    assert!(sign_up["Username"].as_str().unwrap().starts_with("usr_"));
}

#[tokio::test]
async fn invalid_confirmation_code_is_a_verification_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "CodeMismatchException",
            "message": "Invalid verification code provided, please try again."
        })))
        .mount(&server)
        .await;

    let err = gateway(&server.uri())
        .confirm_registration("a@b.com", "000000")
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.kind.code(), "VERIFICATION_FAILED");
}

#[tokio::test]
async fn successful_login_returns_a_token_bundle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header(
            "x-amz-target",
            "AWSCognitoIdentityProviderService.InitiateAuth",
        ))
        .and(body_string_contains("USER_PASSWORD_AUTH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AuthenticationResult": {
                "AccessToken": "access",
                "IdToken": "id",
                "RefreshToken": "refresh",
                "TokenType": "Bearer",
                "ExpiresIn": 3600
            }
        })))
        .mount(&server)
        .await;

    let bundle = gateway(&server.uri())
        .authenticate("a@b.com", "Secret1")
        .await
        .expect("login");

    assert_eq!(bundle.access_token, "access");
    assert_eq!(bundle.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(bundle.token_type, "Bearer");
    assert_eq!(bundle.expires_in, 3600);
}

#[tokio::test]
async fn failed_login_is_generic_and_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "UserNotFoundException",
            "message": "User does not exist."
        })))
        .mount(&server)
        .await;

    let err = gateway(&server.uri())
        .authenticate("nobody@b.com", "wrong")
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.kind.code(), "AUTHENTICATION_FAILED");
    // The provider knows the user was missing; the caller must not.
    assert_eq!(err.message, "Incorrect username or password");
}

#[tokio::test]
async fn challenge_response_without_tokens_fails_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ChallengeName": "NEW_PASSWORD_REQUIRED",
            "ChallengeParameters": {}
        })))
        .mount(&server)
        .await;

    let err = gateway(&server.uri())
        .authenticate("a@b.com", "Secret1")
        .await
        .unwrap_err();

    assert_eq!(err.kind.code(), "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn rejected_refresh_is_a_401_refresh_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("REFRESH_TOKEN_AUTH"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "__type": "NotAuthorizedException",
            "message": "Refresh Token has been revoked"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server.uri())
        .refresh("stale-token", "a@b.com")
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.kind.code(), "REFRESH_FAILED");
    assert_eq!(err.message, "Unable to refresh the token");
}

#[tokio::test]
async fn unreachable_provider_maps_to_upstream_unavailable() {
    // Nothing listens on this port.
    let err = gateway("http://127.0.0.1:9")
        .authenticate("a@b.com", "Secret1")
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    assert_eq!(err.kind.code(), "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn missing_client_secret_short_circuits_before_any_call() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would 404 and fail differently.
    let mut config = provider_config(&server.uri());
    config.client_secret = None;
    let gw = UserPoolGateway::new(reqwest::Client::new(), config);

    let err = gw.authenticate("a@b.com", "Secret1").await.unwrap_err();
    assert_eq!(err.kind.code(), "CONFIG_ERROR");
    assert!(server.received_requests().await.unwrap().is_empty());
}
