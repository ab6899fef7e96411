// HTTP API surface: OAuth callbacks, tool dispatch, status, health

pub mod dispatch;
pub mod integrations;
pub mod oauth;

pub use dispatch::{create_dispatch_router, DispatchAppState};
pub use integrations::{create_integrations_router, IntegrationsAppState};
pub use oauth::{create_oauth_router, OAuthAppState};

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
}

/// Create health check router
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "keyrelay",
        timestamp: Utc::now().to_rfc3339(),
    })
}
