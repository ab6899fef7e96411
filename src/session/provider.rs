//! Per-provider OAuth profiles.
//!
//! The resolve/refresh algorithm is identical for every integration; what
//! differs is captured here: consent and token endpoints, scope list and
//! delimiter, extra consent parameters, and how expiry is computed from the
//! stored payload.

use serde::{Deserialize, Serialize};

/// Supported external integrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Slack,
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Slack => "slack",
            ProviderKind::Google => "google",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "slack" => Some(ProviderKind::Slack),
            "google" => Some(ProviderKind::Google),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stored token's expiry is computed from `stored_at`.
#[derive(Clone, Copy, Debug)]
pub enum ExpiryRule {
    /// Expires only when the provider reported a validity window. Slack
    /// omits `expires_in` unless token rotation is enabled, and a
    /// non-rotating token does not expire.
    WhenReported,
    /// `stored_at + expires_in`, falling back to the given window when the
    /// provider did not report one.
    DefaultSecs(i64),
}

/// OAuth 2.0 configuration for one integration.
#[derive(Clone, Debug)]
pub struct ProviderProfile {
    pub kind: ProviderKind,

    /// OAuth authorization (consent) endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Requested OAuth scopes
    pub scopes: Vec<String>,

    /// Delimiter joining scopes in the consent URL (Slack uses commas,
    /// Google uses spaces)
    pub scope_delimiter: &'static str,

    /// Extra query parameters for the consent URL
    pub extra_auth_params: &'static [(&'static str, &'static str)],

    pub expiry: ExpiryRule,

    /// Client credentials (from environment variables)
    pub client_id: String,
    pub client_secret: String,

    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

impl ProviderProfile {
    pub fn slack(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            kind: ProviderKind::Slack,
            auth_url: "https://slack.com/oauth/v2/authorize".to_string(),
            token_url: "https://slack.com/api/oauth.v2.access".to_string(),
            scopes,
            scope_delimiter: ",",
            extra_auth_params: &[],
            expiry: ExpiryRule::WhenReported,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    pub fn google(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            kind: ProviderKind::Google,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            scopes,
            scope_delimiter: " ",
            // offline access is what yields a refresh token; consent prompt
            // forces Google to reissue one on re-authorization
            extra_auth_params: &[("access_type", "offline"), ("prompt", "consent")],
            expiry: ExpiryRule::DefaultSecs(3600),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    pub fn default_scopes(kind: ProviderKind) -> Vec<String> {
        let scopes: &[&str] = match kind {
            ProviderKind::Slack => &[
                "chat:write",
                "channels:read",
                "groups:read",
                "im:read",
                "mpim:read",
            ],
            ProviderKind::Google => &[
                "https://www.googleapis.com/auth/gmail.readonly",
                "https://www.googleapis.com/auth/gmail.send",
                "https://www.googleapis.com/auth/calendar",
            ],
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }

    /// Build the consent URL, embedding the caller identity as the opaque
    /// `state` parameter.
    pub fn build_auth_url(&self, identity: &str) -> String {
        let scopes = self.scopes.join(self.scope_delimiter);
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(&encode_state(identity)),
        );
        for (key, value) in self.extra_auth_params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }
}

/// Canonical `state` encoding carried through the consent redirect. One
/// format for every provider so the callback can always recover the
/// initiating identity.
pub fn encode_state(identity: &str) -> String {
    format!("client_id:{}", identity)
}

/// Recover the identity from a callback `state` parameter.
pub fn decode_state(state: &str) -> Option<String> {
    let identity = state.strip_prefix("client_id:")?;
    if identity.is_empty() {
        return None;
    }
    Some(identity.to_string())
}
