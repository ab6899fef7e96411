use anyhow::{Context, Result};
use axum::Router;
use keyrelay::api::{
    create_dispatch_router, create_health_router, create_integrations_router, create_oauth_router,
    DispatchAppState, IntegrationsAppState, OAuthAppState,
};
use keyrelay::auth::{HeaderAuth, JwksCache, TokenVerifier, VerifierMode, DEFAULT_JWKS_TTL};
use keyrelay::config::GatewayConfig;
use keyrelay::credentials::{KeyRing, TokenStore};
use keyrelay::session::{IntegrationSession, ProviderKind, ProviderProfile, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Timeout applied to every outbound call (JWKS fetch, token exchange,
/// refresh, provider APIs).
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyrelay=info".into()),
        )
        .init();

    info!("keyrelay starting...");

    let config = GatewayConfig::from_env()?;

    let ring = KeyRing::parse(&config.encryption_keys)
        .context("Invalid KEYRELAY_ENCRYPTION_KEYS")?;
    if ring.is_empty() {
        warn!("No encryption keys configured, token payloads will be stored as plaintext");
    }

    let store = Arc::new(
        TokenStore::open(&config.db_path, ring).context("Failed to open token store")?,
    );

    let http = reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let verifier = Arc::new(build_verifier(&config, http.clone()));

    let header_auth = HeaderAuth {
        enabled: config.auth.header_auth,
        header_name: config.auth.header_auth_name.clone(),
    };
    if header_auth.enabled {
        warn!(
            header = %header_auth.header_name,
            "Trusted-header authentication enabled, signature verification can be bypassed"
        );
    }

    let mut registry = SessionRegistry::new();
    for kind in [ProviderKind::Slack, ProviderKind::Google] {
        if let Some(profile) = provider_profile(kind, &config) {
            info!(integration = %kind, "Integration enabled");
            registry.register(IntegrationSession::new(profile, store.clone(), http.clone()));
        }
    }
    if registry.is_empty() {
        warn!("No integrations are enabled");
    }
    let sessions = Arc::new(registry);

    let app = Router::new()
        .merge(create_health_router())
        .merge(create_oauth_router(OAuthAppState {
            sessions: sessions.clone(),
            store: store.clone(),
            http: http.clone(),
        }))
        .merge(create_dispatch_router(DispatchAppState {
            verifier: verifier.clone(),
            header_auth: header_auth.clone(),
            sessions: sessions.clone(),
            http: http.clone(),
        }))
        .merge(create_integrations_router(IntegrationsAppState {
            verifier,
            header_auth,
            sessions,
        }))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(addr = %config.bind, "keyrelay listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// JWKS mode wins when both a secret and a JWKS URL are configured.
fn build_verifier(config: &GatewayConfig, http: reqwest::Client) -> TokenVerifier {
    let issuer = config.auth.issuer.clone();
    let audience = config.auth.audience.clone();

    match &config.auth.jwks_url {
        Some(url) => TokenVerifier::new(
            VerifierMode::Jwks {
                url: url.clone(),
                cache: JwksCache::new(http, DEFAULT_JWKS_TTL),
            },
            issuer,
            audience,
        ),
        None => TokenVerifier::new(
            VerifierMode::SharedSecret(config.auth.jwt_secret.clone().unwrap_or_default()),
            issuer,
            audience,
        ),
    }
}

fn provider_profile(kind: ProviderKind, config: &GatewayConfig) -> Option<ProviderProfile> {
    let (settings, client) = match kind {
        ProviderKind::Slack => (&config.integrations.slack, &config.slack),
        ProviderKind::Google => (&config.integrations.google, &config.google),
    };

    if !settings.enabled {
        info!(integration = %kind, "Integration disabled in config");
        return None;
    }

    let Some(client) = client else {
        warn!(
            integration = %kind,
            "Integration enabled but KEYRELAY_OAUTH_{}_CLIENT_ID / _CLIENT_SECRET are not set",
            kind.as_str().to_uppercase()
        );
        return None;
    };

    let scopes = settings
        .scopes
        .clone()
        .unwrap_or_else(|| ProviderProfile::default_scopes(kind));
    let redirect_uri = format!("{}/oauth/{}/callback", config.callback_base_url, kind);

    Some(match kind {
        ProviderKind::Slack => ProviderProfile::slack(
            client.client_id.clone(),
            client.client_secret.clone(),
            redirect_uri,
            scopes,
        ),
        ProviderKind::Google => ProviderProfile::google(
            client.client_id.clone(),
            client.client_secret.clone(),
            redirect_uri,
            scopes,
        ),
    })
}
