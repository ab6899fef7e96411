//! Thin clients for the external provider APIs.
//!
//! Each client wraps a resolved access token and exposes the tool surface as
//! typed parameter structs over the provider's REST endpoints. Wire formats
//! belong to the vendors; these wrappers validate parameters, attach the
//! token, and normalize failures into [`ProviderApiError`].

pub mod google;
pub mod slack;

pub use google::GoogleClient;
pub use slack::SlackClient;

/// Failures from a provider API call.
#[derive(Debug)]
pub enum ProviderApiError {
    /// Request never completed (connect failure, timeout)
    Network(String),
    /// Non-success HTTP status from the provider
    Http { status: u16, body: String },
    /// Provider-reported logical error (Slack `ok: false`, Google error body)
    Api(String),
}

impl std::fmt::Display for ProviderApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderApiError::Network(msg) => write!(f, "Provider request failed: {}", msg),
            ProviderApiError::Http { status, body } => {
                write!(f, "Provider returned status {}: {}", status, body)
            }
            ProviderApiError::Api(msg) => write!(f, "Provider API error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderApiError {}
