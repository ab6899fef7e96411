//! OAuth token endpoint exchanges.
//!
//! Both the authorization-code exchange and the refresh-token exchange are
//! form-encoded POSTs against the provider's token endpoint. Responses are
//! kept as raw JSON: the callback handler enriches and persists them, and
//! Slack's `{ok: false, error}` envelope is folded into the error type here
//! so callers never see a "successful" failure.

use super::provider::ProviderProfile;
use std::collections::HashMap;

/// Exchange failures, split by who caused them.
#[derive(Debug)]
pub enum ExchangeError {
    /// Request never completed (connect failure, timeout)
    Network(String),
    /// Provider answered with a non-success HTTP status
    Http { status: u16, body: String },
    /// Provider reported a logical error (`ok: false` or an `error` field)
    Provider(String),
    /// Response was not the JSON shape a token endpoint returns
    Malformed(String),
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::Network(msg) => write!(f, "Token exchange request failed: {}", msg),
            ExchangeError::Http { status, body } => {
                write!(f, "Token endpoint returned status {}: {}", status, body)
            }
            ExchangeError::Provider(msg) => write!(f, "Provider rejected the exchange: {}", msg),
            ExchangeError::Malformed(msg) => write!(f, "Unparseable token response: {}", msg),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// Exchange an authorization code for a token payload.
pub async fn exchange_code(
    client: &reqwest::Client,
    profile: &ProviderProfile,
    code: &str,
) -> Result<serde_json::Value, ExchangeError> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", profile.redirect_uri.as_str());
    form.insert("client_id", profile.client_id.as_str());
    form.insert("client_secret", profile.client_secret.as_str());

    tracing::debug!(
        integration = %profile.kind,
        "Exchanging authorization code for token"
    );

    post_token_request(client, &profile.token_url, &form).await
}

/// Trade a refresh token for a fresh access token.
pub async fn refresh_token(
    client: &reqwest::Client,
    profile: &ProviderProfile,
    refresh_token: &str,
) -> Result<serde_json::Value, ExchangeError> {
    let mut form = HashMap::new();
    form.insert("grant_type", "refresh_token");
    form.insert("refresh_token", refresh_token);
    form.insert("client_id", profile.client_id.as_str());
    form.insert("client_secret", profile.client_secret.as_str());

    tracing::debug!(integration = %profile.kind, "Refreshing access token");

    post_token_request(client, &profile.token_url, &form).await
}

async fn post_token_request(
    client: &reqwest::Client,
    token_url: &str,
    form: &HashMap<&str, &str>,
) -> Result<serde_json::Value, ExchangeError> {
    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| ExchangeError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ExchangeError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ExchangeError::Malformed(e.to_string()))?;

    // Slack answers HTTP 200 with {ok: false, error: "..."} on failure
    if json.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let error = json
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        return Err(ExchangeError::Provider(error));
    }

    if json.get("access_token").and_then(|v| v.as_str()).is_none() {
        return Err(ExchangeError::Malformed(
            "Response carries no access_token".to_string(),
        ));
    }

    Ok(json)
}
