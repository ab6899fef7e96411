//! Gateway configuration.
//!
//! Everything is assembled once at startup: secrets and endpoints come from
//! `KEYRELAY_*` environment variables, integration enablement and scope
//! overrides from an optional TOML file. The resulting value is threaded
//! through router state rather than a global settings singleton.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address
    pub bind: String,
    /// SQLite database path
    pub db_path: String,
    /// Public base URL for OAuth redirect URIs
    pub callback_base_url: String,
    /// Comma-separated base64 encryption keys, newest first (may be empty)
    pub encryption_keys: String,
    pub auth: AuthSettings,
    pub slack: Option<OAuthClient>,
    pub google: Option<OAuthClient>,
    pub integrations: IntegrationsConfig,
}

/// Inbound token verification settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// HS256 shared secret (shared-secret mode)
    pub jwt_secret: Option<String>,
    /// JWKS endpoint (asymmetric mode; takes precedence over the secret)
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Trusted-header identity assertion; off by default
    pub header_auth: bool,
    pub header_auth_name: String,
}

/// OAuth client credentials for one provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

/// Integration enablement and scope overrides (TOML file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub slack: IntegrationSettings,
    #[serde(default)]
    pub google: IntegrationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scope override; falls back to the provider defaults when absent
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            scopes: None,
        }
    }
}

impl GatewayConfig {
    /// Build from environment variables, loading the integrations file when
    /// `KEYRELAY_CONFIG` points at one.
    pub fn from_env() -> Result<Self> {
        let auth = AuthSettings {
            jwt_secret: env_opt("KEYRELAY_JWT_SECRET"),
            jwks_url: env_opt("KEYRELAY_JWKS_URL"),
            issuer: env_opt("KEYRELAY_JWT_ISSUER"),
            audience: env_opt("KEYRELAY_JWT_AUDIENCE"),
            header_auth: env_opt("KEYRELAY_HEADER_AUTH")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            header_auth_name: env_opt("KEYRELAY_HEADER_AUTH_NAME")
                .unwrap_or_else(|| "x-forwarded-user".to_string()),
        };

        if auth.jwt_secret.is_none() && auth.jwks_url.is_none() {
            bail!(
                "Missing token verification config: set KEYRELAY_JWT_SECRET or KEYRELAY_JWKS_URL"
            );
        }

        let integrations = match env_opt("KEYRELAY_CONFIG") {
            Some(path) => IntegrationsConfig::load(&path)?,
            None => IntegrationsConfig::default(),
        };

        Ok(Self {
            bind: env_opt("KEYRELAY_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            db_path: env_opt("KEYRELAY_DB_PATH").unwrap_or_else(|| "keyrelay.db".to_string()),
            callback_base_url: env_opt("KEYRELAY_CALLBACK_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            encryption_keys: env_opt("KEYRELAY_ENCRYPTION_KEYS").unwrap_or_default(),
            auth,
            slack: oauth_client_from_env("SLACK"),
            google: oauth_client_from_env("GOOGLE"),
            integrations,
        })
    }
}

impl IntegrationsConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;
        toml::from_str(&raw).context("Failed to parse config file")
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn oauth_client_from_env(provider: &str) -> Option<OAuthClient> {
    let client_id = env_opt(&format!("KEYRELAY_OAUTH_{}_CLIENT_ID", provider))?;
    let client_secret = env_opt(&format!("KEYRELAY_OAUTH_{}_CLIENT_SECRET", provider))?;
    Some(OAuthClient {
        client_id,
        client_secret,
    })
}
