// Integration tests for the integration status API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use keyrelay::api::{create_integrations_router, IntegrationsAppState};
use keyrelay::auth::{HeaderAuth, TokenVerifier, VerifierMode};
use keyrelay::credentials::{KeyRing, TokenData, TokenStore};
use keyrelay::session::{IntegrationSession, ProviderKind, ProviderProfile, SessionRegistry};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "status-test-secret";

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap()
}

fn bearer_token(sub: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({"sub": sub, "iat": now, "exp": now + 3600});
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn create_test_app() -> (Router, Arc<TokenStore>) {
    let store = Arc::new(TokenStore::open(":memory:", KeyRing::empty()).unwrap());

    let mut registry = SessionRegistry::new();
    registry.register(IntegrationSession::new(
        ProviderProfile::slack(
            "slack-client-id".to_string(),
            "slack-client-secret".to_string(),
            "http://localhost:8000/oauth/slack/callback".to_string(),
            ProviderProfile::default_scopes(ProviderKind::Slack),
        ),
        store.clone(),
        http_client(),
    ));
    registry.register(IntegrationSession::new(
        ProviderProfile::google(
            "google-client-id".to_string(),
            "google-client-secret".to_string(),
            "http://localhost:8000/oauth/google/callback".to_string(),
            ProviderProfile::default_scopes(ProviderKind::Google),
        ),
        store.clone(),
        http_client(),
    ));

    let state = IntegrationsAppState {
        verifier: Arc::new(TokenVerifier::new(
            VerifierMode::SharedSecret(SECRET.to_string()),
            None,
            None,
        )),
        header_auth: HeaderAuth::default(),
        sessions: Arc::new(registry),
    };

    (create_integrations_router(state), store)
}

async fn get(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }

    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_list_requires_authentication() {
    let (app, _) = create_test_app();

    let (status, _) = get(app, "/api/integrations", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_shows_authorization_state() {
    let (app, store) = create_test_app();
    store
        .write("alice", "slack", &TokenData::new("xoxb-token"))
        .unwrap();

    let token = bearer_token("alice");
    let (status, json) = get(app, "/api/integrations", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    let integrations = json["integrations"].as_array().unwrap();
    assert_eq!(integrations.len(), 2);

    // Sorted by name: google then slack
    assert_eq!(integrations[0]["name"], "google");
    assert_eq!(integrations[0]["authorized"], false);
    assert_eq!(integrations[1]["name"], "slack");
    assert_eq!(integrations[1]["authorized"], true);
}

#[tokio::test]
async fn test_status_carries_consent_url_until_authorized() {
    let (app, store) = create_test_app();
    let token = bearer_token("alice");

    let (status, json) = get(
        app.clone(),
        "/api/integrations/google/status",
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["authorized"], false);
    let oauth_url = json["oauth_url"].as_str().unwrap();
    assert!(oauth_url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(oauth_url.contains("state=client_id%3Aalice"));

    // After authorization the consent URL disappears
    let mut data = TokenData::new("ya29.token");
    data.expires_in = Some(3600);
    store.write("alice", "google", &data).unwrap();

    let (status, json) = get(app, "/api/integrations/google/status", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["authorized"], true);
    assert!(json.get("oauth_url").is_none());
}

#[tokio::test]
async fn test_unknown_integration_not_found() {
    let (app, _) = create_test_app();
    let token = bearer_token("alice");

    let (status, _) = get(app, "/api/integrations/github/status", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
