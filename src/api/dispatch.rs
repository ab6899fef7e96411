//! Authenticated tool dispatch.
//!
//! `POST /api/tools/:integration/:tool` verifies the caller, resolves a live
//! access token for the target integration (refreshing if needed), and
//! invokes the named tool against the provider API. When no usable
//! credential exists the response is a 200 with `requires_auth: true` and a
//! consent URL; callers branch on that rather than treating it as failure.

use crate::auth::{authenticate, AuthError, HeaderAuth, TokenVerifier};
use crate::providers::{google, slack, GoogleClient, ProviderApiError, SlackClient};
use crate::session::{ProviderKind, Resolution, SessionRegistry};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for tool dispatch
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
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

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated(detail) => {
                // One generic message for every credential problem; the
                // reason stays in the logs
                warn!(detail = %detail, "Request rejected as unauthenticated");
                AppError::Unauthorized("Invalid or expired credentials".to_string())
            }
            AuthError::Configuration(detail) => {
                warn!(detail = %detail, "Token verifier misconfigured");
                AppError::ServerError("Authentication is not configured correctly".to_string())
            }
        }
    }
}

/// Shared application state for tool dispatch
#[derive(Clone)]
pub struct DispatchAppState {
    pub verifier: Arc<TokenVerifier>,
    pub header_auth: HeaderAuth,
    pub sessions: Arc<SessionRegistry>,
    pub http: reqwest::Client,
}

/// Response when the caller must complete an OAuth flow first
#[derive(Serialize)]
pub struct AuthorizationRequiredResponse {
    pub requires_auth: bool,
    pub oauth_url: String,
    pub instructions: String,
    pub scopes: Vec<String>,
}

/// Create tool dispatch router
pub fn create_dispatch_router(state: DispatchAppState) -> Router {
    Router::new()
        .route("/api/tools/:integration/:tool", post(dispatch_tool))
        .with_state(Arc::new(state))
}

/// POST /api/tools/:integration/:tool
async fn dispatch_tool(
    State(state): State<Arc<DispatchAppState>>,
    Path((integration, tool)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Option<Json<serde_json::Value>>,
) -> Result<Response, AppError> {
    let identity = authenticate(&headers, &state.verifier, &state.header_auth).await?;

    let kind = ProviderKind::parse(&integration).ok_or_else(|| {
        AppError::NotFound(format!("Integration '{}' not found", integration))
    })?;

    let session = state.sessions.get(kind).ok_or_else(|| {
        AppError::NotFound(format!("Integration '{}' is not enabled", integration))
    })?;

    debug!(
        client_id = %identity.subject,
        integration = %integration,
        tool = %tool,
        "Dispatching tool call"
    );

    let access_token = match session.resolve(&identity.subject).await.map_err(|e| {
        warn!(error = %e, "Credential store unavailable");
        AppError::ServerError("Credential storage unavailable".to_string())
    })? {
        Resolution::AccessToken(token) => token,
        Resolution::AuthorizationRequired { url, scopes } => {
            return Ok(Json(AuthorizationRequiredResponse {
                requires_auth: true,
                oauth_url: url,
                instructions: format!(
                    "Visit this URL to authorize the application with your {} account",
                    integration
                ),
                scopes,
            })
            .into_response());
        }
    };

    let Json(params) = payload.unwrap_or_else(|| Json(serde_json::json!({})));

    let result = match kind {
        ProviderKind::Slack => {
            call_slack_tool(&tool, state.http.clone(), access_token, params).await?
        }
        ProviderKind::Google => {
            call_google_tool(&tool, state.http.clone(), access_token, params).await?
        }
    };

    Ok(Json(result).into_response())
}

async fn call_slack_tool(
    tool: &str,
    http: reqwest::Client,
    access_token: String,
    params: serde_json::Value,
) -> Result<serde_json::Value, AppError> {
    let client = SlackClient::new(http, access_token);

    let result = match tool {
        "send_message" => {
            client
                .send_message(&parse_params::<slack::SendMessageParams>(params)?)
                .await
        }
        "update_message" => {
            client
                .update_message(&parse_params::<slack::UpdateMessageParams>(params)?)
                .await
        }
        "delete_message" => {
            client
                .delete_message(&parse_params::<slack::DeleteMessageParams>(params)?)
                .await
        }
        "schedule_message" => {
            client
                .schedule_message(&parse_params::<slack::ScheduleMessageParams>(params)?)
                .await
        }
        "list_channels" => {
            client
                .list_channels(&parse_params::<slack::ListChannelsParams>(params)?)
                .await
        }
        _ => return Err(AppError::NotFound(format!("Unknown tool: {}", tool))),
    };

    result.map_err(provider_error)
}

async fn call_google_tool(
    tool: &str,
    http: reqwest::Client,
    access_token: String,
    params: serde_json::Value,
) -> Result<serde_json::Value, AppError> {
    let client = GoogleClient::new(http, access_token);

    let result = match tool {
        "gmail.list_messages" => {
            client
                .list_messages(&parse_params::<google::ListMessagesParams>(params)?)
                .await
        }
        "gmail.get_message" => {
            client
                .get_message(&parse_params::<google::GetMessageParams>(params)?)
                .await
        }
        "gmail.send_message" => {
            client
                .send_email(&parse_params::<google::SendEmailParams>(params)?)
                .await
        }
        "calendar.list_events" => {
            client
                .list_events(&parse_params::<google::ListEventsParams>(params)?)
                .await
        }
        "calendar.create_event" => {
            client
                .create_event(&parse_params::<google::CreateEventParams>(params)?)
                .await
        }
        _ => return Err(AppError::NotFound(format!("Unknown tool: {}", tool))),
    };

    result.map_err(provider_error)
}

fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::BadRequest(format!("Invalid parameters: {}", e)))
}

fn provider_error(e: ProviderApiError) -> AppError {
    match e {
        // The provider's own error string goes back to the caller for
        // debuggability
        ProviderApiError::Api(msg) => AppError::BadRequest(msg),
        ProviderApiError::Http { status, body } => {
            AppError::BadGateway(format!("Provider returned status {}: {}", status, body))
        }
        ProviderApiError::Network(msg) => {
            AppError::BadGateway(format!("Provider request failed: {}", msg))
        }
    }
}
