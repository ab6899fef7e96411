//! Integration sessions: resolve a live access token or demand consent.
//!
//! One generic algorithm serves every provider:
//!
//! 1. Read the token record for (identity, integration).
//! 2. Absent → `AuthorizationRequired` with a fresh consent URL.
//! 3. Present and unexpired → the stored access token, untouched.
//! 4. Expired with a refresh token → refresh against the provider, merge
//!    the response into the payload, persist once, return the new token.
//! 5. Expired without a refresh token, or refresh rejected → back to
//!    `AuthorizationRequired`; refresh is never retried within a request.
//!
//! The store read completes (and releases its transaction) before any
//! provider call; the refreshed payload is persisted in a separate write.

pub mod exchange;
pub mod provider;

pub use exchange::ExchangeError;
pub use provider::{decode_state, encode_state, ExpiryRule, ProviderKind, ProviderProfile};

use crate::credentials::{StorageError, StoredToken, TokenData, TokenStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of resolving a session. Not an error: callers branch on it.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// A usable access token
    AccessToken(String),
    /// No usable credential; the user must (re-)authorize
    AuthorizationRequired { url: String, scopes: Vec<String> },
}

/// Session failures. Only the storage layer can produce one; everything
/// provider-side degrades to `AuthorizationRequired`.
#[derive(Debug)]
pub enum SessionError {
    Storage(StorageError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Storage(e) => write!(f, "Session storage error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StorageError> for SessionError {
    fn from(e: StorageError) -> Self {
        SessionError::Storage(e)
    }
}

/// Token resolution for one external provider.
pub struct IntegrationSession {
    profile: ProviderProfile,
    store: Arc<TokenStore>,
    http: reqwest::Client,
}

impl IntegrationSession {
    pub fn new(profile: ProviderProfile, store: Arc<TokenStore>, http: reqwest::Client) -> Self {
        Self {
            profile,
            store,
            http,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.profile.kind
    }

    pub fn scopes(&self) -> &[String] {
        &self.profile.scopes
    }

    /// Consent URL for this integration, with the identity riding in `state`.
    pub fn authorization_url(&self, identity: &str) -> String {
        self.profile.build_auth_url(identity)
    }

    pub(crate) fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// Whether a stored, unexpired credential exists without touching the
    /// provider. Expired-but-refreshable still counts as authorized.
    pub fn is_authorized(&self, identity: &str) -> Result<bool, SessionError> {
        let stored = self.store.read(identity, self.profile.kind.as_str())?;
        Ok(match stored {
            None => false,
            Some(stored) => {
                !is_expired(&stored, self.profile.expiry) || stored.data.refresh_token.is_some()
            }
        })
    }

    /// Produce a ready-to-use access token, refreshing if needed.
    pub async fn resolve(&self, identity: &str) -> Result<Resolution, SessionError> {
        let integration = self.profile.kind.as_str();

        let Some(stored) = self.store.read(identity, integration)? else {
            debug!(
                client_id = %identity,
                integration = %integration,
                "No stored token, authorization required"
            );
            return Ok(self.authorization_required(identity));
        };

        if !is_expired(&stored, self.profile.expiry) {
            return Ok(Resolution::AccessToken(stored.data.access_token));
        }

        let Some(refresh) = stored.data.refresh_token.clone() else {
            debug!(
                client_id = %identity,
                integration = %integration,
                "Token expired with no refresh token, authorization required"
            );
            return Ok(self.authorization_required(identity));
        };

        // The read transaction is long gone by the time we hit the network
        match exchange::refresh_token(&self.http, &self.profile, &refresh).await {
            Ok(response) => {
                let mut data = stored.data;
                merge_refresh_response(&mut data, &response);
                self.store.write(identity, integration, &data)?;
                info!(
                    client_id = %identity,
                    integration = %integration,
                    "Access token refreshed"
                );
                Ok(Resolution::AccessToken(data.access_token))
            }
            Err(e) => {
                // Expected when the user revoked access or a concurrent
                // refresh consumed the rotating refresh token: fall back to
                // re-authorization rather than failing the request.
                warn!(
                    client_id = %identity,
                    integration = %integration,
                    error = %e,
                    "Token refresh failed, authorization required"
                );
                Ok(self.authorization_required(identity))
            }
        }
    }

    fn authorization_required(&self, identity: &str) -> Resolution {
        Resolution::AuthorizationRequired {
            url: self.profile.build_auth_url(identity),
            scopes: self.profile.scopes.clone(),
        }
    }
}

/// The sessions this deployment exposes, keyed by integration.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: std::collections::HashMap<ProviderKind, IntegrationSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, session: IntegrationSession) {
        self.sessions.insert(session.kind(), session);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&IntegrationSession> {
        self.sessions.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.sessions.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Expiry check per the provider's rule; see [`ExpiryRule`].
fn is_expired(stored: &StoredToken, rule: ExpiryRule) -> bool {
    let window = match rule {
        ExpiryRule::WhenReported => match stored.data.expires_in {
            Some(secs) => secs,
            None => return false,
        },
        ExpiryRule::DefaultSecs(default) => stored.data.expires_in.unwrap_or(default),
    };
    Utc::now() >= stored.stored_at + Duration::seconds(window)
}

/// Fold a refresh response into the stored payload. The refresh token is
/// replaced only when the provider issued a new one; unknown fields land in
/// `extra` so nothing the provider reports is dropped.
fn merge_refresh_response(data: &mut TokenData, response: &serde_json::Value) {
    let Some(obj) = response.as_object() else {
        return;
    };

    for (key, value) in obj {
        match key.as_str() {
            "access_token" => {
                if let Some(token) = value.as_str() {
                    data.access_token = token.to_string();
                }
            }
            "refresh_token" => {
                if let Some(token) = value.as_str() {
                    data.refresh_token = Some(token.to_string());
                }
            }
            "token_type" => {
                if let Some(tt) = value.as_str() {
                    data.token_type = Some(tt.to_string());
                }
            }
            "scope" => {
                if let Some(scope) = value.as_str() {
                    data.scope = Some(scope.to_string());
                }
            }
            "expires_in" => {
                if let Some(secs) = value.as_i64() {
                    data.expires_in = Some(secs);
                }
            }
            _ => {
                data.extra.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::KeyRing;

    fn store() -> Arc<TokenStore> {
        Arc::new(TokenStore::open(":memory:", KeyRing::empty()).unwrap())
    }

    fn http() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn google_session(store: Arc<TokenStore>, token_url: Option<String>) -> IntegrationSession {
        let mut profile = ProviderProfile::google(
            "google-client".to_string(),
            "google-secret".to_string(),
            "http://localhost:8000/oauth/google/callback".to_string(),
            vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        );
        if let Some(url) = token_url {
            profile.token_url = url;
        }
        IntegrationSession::new(profile, store, http())
    }

    fn slack_session(store: Arc<TokenStore>) -> IntegrationSession {
        let profile = ProviderProfile::slack(
            "slack-client".to_string(),
            "slack-secret".to_string(),
            "http://localhost:8000/oauth/slack/callback".to_string(),
            ProviderProfile::default_scopes(ProviderKind::Slack),
        );
        IntegrationSession::new(profile, store, http())
    }

    #[tokio::test]
    async fn test_no_stored_token_requires_authorization() {
        let session = google_session(store(), None);

        match session.resolve("alice").await.unwrap() {
            Resolution::AuthorizationRequired { url, scopes } => {
                assert!(url.contains("state=client_id%3Aalice"));
                assert!(!scopes.is_empty());
            }
            Resolution::AccessToken(_) => panic!("expected AuthorizationRequired"),
        }
    }

    #[tokio::test]
    async fn test_unexpired_token_returned_without_write() {
        let store = store();
        let mut data = TokenData::new("ya29.current");
        data.expires_in = Some(3600);
        store.write("alice", "google", &data).unwrap();
        let before = store.read("alice", "google").unwrap().unwrap().stored_at;

        let session = google_session(store.clone(), None);
        match session.resolve("alice").await.unwrap() {
            Resolution::AccessToken(token) => assert_eq!(token, "ya29.current"),
            Resolution::AuthorizationRequired { .. } => panic!("expected AccessToken"),
        }

        // Read-only path: the record was not rewritten
        let after = store.read("alice", "google").unwrap().unwrap().stored_at;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_persisted_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "access_token": "ya29.fresh",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/gmail.readonly",
                    "token_type": "Bearer"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let store = store();
        let mut data = TokenData::new("ya29.stale");
        data.refresh_token = Some("1//refresh".to_string());
        data.expires_in = Some(0); // expired the moment it was stored
        store.write("alice", "google", &data).unwrap();
        let before = store.read("alice", "google").unwrap().unwrap().stored_at;

        std::thread::sleep(std::time::Duration::from_millis(10));

        let session = google_session(store.clone(), Some(format!("{}/token", server.url())));
        match session.resolve("alice").await.unwrap() {
            Resolution::AccessToken(token) => assert_eq!(token, "ya29.fresh"),
            Resolution::AuthorizationRequired { .. } => panic!("expected AccessToken"),
        }

        let stored = store.read("alice", "google").unwrap().unwrap();
        assert_eq!(stored.data.access_token, "ya29.fresh");
        assert_eq!(stored.data.expires_in, Some(3599));
        // Old refresh token survives when the provider didn't reissue one
        assert_eq!(stored.data.refresh_token.as_deref(), Some("1//refresh"));
        assert!(stored.stored_at > before);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reissued_refresh_token_replaces_old_one() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "access_token": "ya29.fresh",
                    "refresh_token": "1//rotated",
                    "expires_in": 3600
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = store();
        let mut data = TokenData::new("ya29.stale");
        data.refresh_token = Some("1//original".to_string());
        data.expires_in = Some(0);
        store.write("alice", "google", &data).unwrap();

        let session = google_session(store.clone(), Some(format!("{}/token", server.url())));
        session.resolve("alice").await.unwrap();

        let stored = store.read("alice", "google").unwrap().unwrap();
        assert_eq!(stored.data.refresh_token.as_deref(), Some("1//rotated"));
    }

    #[tokio::test]
    async fn test_refresh_failure_requires_authorization_without_write() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let store = store();
        let mut data = TokenData::new("ya29.stale");
        data.refresh_token = Some("1//revoked".to_string());
        data.expires_in = Some(0);
        store.write("alice", "google", &data).unwrap();
        let before = store.read("alice", "google").unwrap().unwrap().stored_at;

        let session = google_session(store.clone(), Some(format!("{}/token", server.url())));
        match session.resolve("alice").await.unwrap() {
            Resolution::AuthorizationRequired { url, .. } => {
                assert!(url.contains("client_id=google-client"));
            }
            Resolution::AccessToken(_) => panic!("expected AuthorizationRequired"),
        }

        // Failed refresh leaves the record untouched
        let after = store.read("alice", "google").unwrap().unwrap().stored_at;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_requires_authorization() {
        let store = store();
        let mut data = TokenData::new("ya29.stale");
        data.expires_in = Some(0);
        store.write("alice", "google", &data).unwrap();

        let session = google_session(store.clone(), None);
        assert!(matches!(
            session.resolve("alice").await.unwrap(),
            Resolution::AuthorizationRequired { .. }
        ));
    }

    #[tokio::test]
    async fn test_slack_token_without_expiry_never_expires() {
        let store = store();
        // Rotation disabled: Slack reports no expires_in
        let data = TokenData::new("xoxb-eternal");
        store.write("alice", "slack", &data).unwrap();

        let session = slack_session(store.clone());
        match session.resolve("alice").await.unwrap() {
            Resolution::AccessToken(token) => assert_eq!(token, "xoxb-eternal"),
            Resolution::AuthorizationRequired { .. } => panic!("expected AccessToken"),
        }
    }

    #[tokio::test]
    async fn test_google_default_expiry_window_applies() {
        let store = store();
        // No expires_in reported: Google's default window keeps it fresh
        let data = TokenData::new("ya29.fresh-enough");
        store.write("alice", "google", &data).unwrap();

        let session = google_session(store.clone(), None);
        assert!(matches!(
            session.resolve("alice").await.unwrap(),
            Resolution::AccessToken(_)
        ));
    }

    #[test]
    fn test_is_authorized() {
        let store = store();
        let session = google_session(store.clone(), None);

        assert!(!session.is_authorized("alice").unwrap());

        let mut data = TokenData::new("ya29.token");
        data.expires_in = Some(3600);
        store.write("alice", "google", &data).unwrap();
        assert!(session.is_authorized("alice").unwrap());

        // Expired but refreshable still counts
        let mut data = TokenData::new("ya29.stale");
        data.expires_in = Some(0);
        data.refresh_token = Some("1//refresh".to_string());
        store.write("bob", "google", &data).unwrap();
        assert!(session.is_authorized("bob").unwrap());

        // Expired with no way back does not
        let mut data = TokenData::new("ya29.dead");
        data.expires_in = Some(0);
        store.write("carol", "google", &data).unwrap();
        assert!(!session.is_authorized("carol").unwrap());
    }
}
