//! Integration status endpoints.
//!
//! Lets an authenticated caller see which integrations are enabled, whether
//! they hold a usable credential, and where to go to authorize one.

use crate::auth::{authenticate, AuthError, HeaderAuth, TokenVerifier};
use crate::session::{ProviderKind, SessionRegistry};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for integration status
enum AppError {
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
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

/// Shared application state for integration status
#[derive(Clone)]
pub struct IntegrationsAppState {
    pub verifier: Arc<TokenVerifier>,
    pub header_auth: HeaderAuth,
    pub sessions: Arc<SessionRegistry>,
}

/// Status summary (for list endpoint)
#[derive(Serialize)]
pub struct IntegrationSummary {
    pub name: String,
    pub authorized: bool,
}

/// List integrations response
#[derive(Serialize)]
pub struct ListIntegrationsResponse {
    pub integrations: Vec<IntegrationSummary>,
}

/// Detailed status (for single integration endpoint)
#[derive(Serialize)]
pub struct IntegrationStatus {
    pub name: String,
    pub authorized: bool,
    /// Consent URL, present only when authorization is needed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_url: Option<String>,
    pub scopes: Vec<String>,
}

/// Create integration status router
pub fn create_integrations_router(state: IntegrationsAppState) -> Router {
    Router::new()
        .route("/api/integrations", get(list_integrations))
        .route("/api/integrations/:name/status", get(integration_status))
        .with_state(Arc::new(state))
}

/// GET /api/integrations - status of every enabled integration
async fn list_integrations(
    State(state): State<Arc<IntegrationsAppState>>,
    headers: HeaderMap,
) -> Result<Json<ListIntegrationsResponse>, AppError> {
    let identity = authenticate(&headers, &state.verifier, &state.header_auth).await?;

    debug!(client_id = %identity.subject, "Listing integrations");

    let mut integrations = Vec::new();
    for kind in state.sessions.kinds() {
        let Some(session) = state.sessions.get(kind) else {
            continue;
        };
        let authorized = session.is_authorized(&identity.subject).map_err(|e| {
            warn!(error = %e, "Credential store unavailable");
            AppError::ServerError("Credential storage unavailable".to_string())
        })?;
        integrations.push(IntegrationSummary {
            name: kind.as_str().to_string(),
            authorized,
        });
    }

    Ok(Json(ListIntegrationsResponse { integrations }))
}

/// GET /api/integrations/:name/status - detail for one integration
async fn integration_status(
    State(state): State<Arc<IntegrationsAppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<IntegrationStatus>, AppError> {
    let identity = authenticate(&headers, &state.verifier, &state.header_auth).await?;

    let kind = ProviderKind::parse(&name)
        .ok_or_else(|| AppError::NotFound(format!("Integration '{}' not found", name)))?;
    let session = state
        .sessions
        .get(kind)
        .ok_or_else(|| AppError::NotFound(format!("Integration '{}' is not enabled", name)))?;

    let authorized = session.is_authorized(&identity.subject).map_err(|e| {
        warn!(error = %e, "Credential store unavailable");
        AppError::ServerError("Credential storage unavailable".to_string())
    })?;

    Ok(Json(IntegrationStatus {
        name: kind.as_str().to_string(),
        authorized,
        oauth_url: if authorized {
            None
        } else {
            Some(session.authorization_url(&identity.subject))
        },
        scopes: session.scopes().to_vec(),
    }))
}
