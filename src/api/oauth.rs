//! OAuth callback endpoints.
//!
//! Completes the authorization-code flow per integration:
//! `GET /oauth/:integration/callback?code&state&error`. The `state`
//! parameter carries the caller identity that initiated the flow, so the
//! exchanged credential is stored against the right client. Responses are
//! redacted: the access token never appears in a callback response body.

use crate::credentials::{TokenData, TokenStore};
use crate::session::{decode_state, exchange, ExchangeError, ProviderKind, SessionRegistry};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for OAuth endpoints
enum AppError {
    BadRequest(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for OAuth callbacks
#[derive(Clone)]
pub struct OAuthAppState {
    pub sessions: Arc<SessionRegistry>,
    pub store: Arc<TokenStore>,
    pub http: reqwest::Client,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth success response (redacted: no token material)
#[derive(Serialize)]
pub struct OAuthSuccessResponse {
    success: bool,
    message: String,
    integration: String,
    identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<String>,
    timestamp: String,
}

/// Create OAuth callback router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/oauth/:integration/callback", get(oauth_callback))
        .with_state(Arc::new(state))
}

/// GET /oauth/:integration/callback
///
/// Exchanges the authorization code and persists the enriched credential
/// for the identity recovered from `state`.
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Path(integration): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<OAuthSuccessResponse>, AppError> {
    debug!(integration = %integration, "OAuth callback received");

    let kind = ProviderKind::parse(&integration).ok_or_else(|| {
        AppError::NotFound(format!("Integration '{}' not found", integration))
    })?;

    let session = state.sessions.get(kind).ok_or_else(|| {
        AppError::NotFound(format!("Integration '{}' is not enabled", integration))
    })?;

    // Provider-reported denial comes before parameter checks: the provider
    // sends error instead of code
    if let Some(provider_error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            integration = %integration,
            error = %provider_error,
            description = %description,
            "OAuth authorization failed"
        );
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {}",
            provider_error
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let raw_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let identity = decode_state(&raw_state).ok_or_else(|| {
        AppError::BadRequest("Invalid 'state' parameter: no client identity".to_string())
    })?;

    debug!(
        integration = %integration,
        client_id = %identity,
        "Exchanging authorization code"
    );

    let response = exchange::exchange_code(&state.http, session.profile(), &code)
        .await
        .map_err(|e| {
            warn!(integration = %integration, error = %e, "Token exchange failed");
            match e {
                ExchangeError::Provider(msg) => {
                    AppError::BadRequest(format!("OAuth token exchange failed: {}", msg))
                }
                ExchangeError::Http { status, body } if status < 500 => AppError::BadRequest(
                    format!("OAuth token exchange failed with status {}: {}", status, body),
                ),
                other => {
                    AppError::BadGateway(format!("Failed to exchange authorization code: {}", other))
                }
            }
        })?;

    let payload = build_token_payload(kind, &response, &identity);
    let team = payload
        .extra
        .get("team_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    state
        .store
        .write(&identity, kind.as_str(), &payload)
        .map_err(|e| {
            error!(
                integration = %integration,
                client_id = %identity,
                error = %e,
                "Failed to store credentials"
            );
            AppError::ServerError("Failed to store credentials".to_string())
        })?;

    info!(
        integration = %integration,
        client_id = %identity,
        has_refresh_token = payload.refresh_token.is_some(),
        "OAuth flow completed successfully"
    );

    Ok(Json(OAuthSuccessResponse {
        success: true,
        message: format!(
            "Successfully authorized! You can now use {} tools.",
            integration
        ),
        integration,
        identity,
        team,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Shape the provider's exchange response into the stored payload.
///
/// Known OAuth fields are lifted into typed slots; everything else the
/// provider sent rides along in `extra`, joined by echo-back metadata (the
/// initiating identity and a creation timestamp) and, for Slack, flattened
/// team/user fields.
fn build_token_payload(
    kind: ProviderKind,
    response: &serde_json::Value,
    identity: &str,
) -> TokenData {
    // exchange_code guarantees access_token is present
    let mut data = TokenData::new(
        response
            .get("access_token")
            .and_then(|v| v.as_str())
            .unwrap_or_default(),
    );

    if let Some(obj) = response.as_object() {
        for (key, value) in obj {
            match key.as_str() {
                "access_token" => {}
                "refresh_token" => {
                    data.refresh_token = value.as_str().map(|s| s.to_string());
                }
                "token_type" => {
                    data.token_type = value.as_str().map(|s| s.to_string());
                }
                "scope" => {
                    data.scope = value.as_str().map(|s| s.to_string());
                }
                "expires_in" => {
                    data.expires_in = value.as_i64();
                }
                _ => {
                    data.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    if kind == ProviderKind::Slack {
        if let Some(team_id) = response.pointer("/team/id").and_then(|v| v.as_str()) {
            data.extra
                .insert("team_id".to_string(), serde_json::json!(team_id));
        }
        if let Some(team_name) = response.pointer("/team/name").and_then(|v| v.as_str()) {
            data.extra
                .insert("team_name".to_string(), serde_json::json!(team_name));
        }
        if let Some(user_id) = response.pointer("/authed_user/id").and_then(|v| v.as_str()) {
            data.extra
                .insert("authed_user_id".to_string(), serde_json::json!(user_id));
        }
    }

    data.extra
        .insert("identity".to_string(), serde_json::json!(identity));
    data.extra.insert(
        "created_at".to_string(),
        serde_json::json!(Utc::now().to_rfc3339()),
    );

    data
}
