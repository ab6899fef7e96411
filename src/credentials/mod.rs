//! Encrypted credential storage for per-integration OAuth tokens.
//!
//! One token record exists per (client identity, integration type). The
//! payload is serialized to JSON and, when a key ring is configured, wrapped
//! in a versioned AES-256-GCM envelope before hitting SQLite.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - upsert / read per (client, kind)      │
//! │  - transparent envelope handling         │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Envelope Module                    │
//! │  - enc:v1: prefix, AES-256-GCM           │
//! │  - key ring: encrypt newest, try all     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! │  - one row per (client, integration)     │
//! │  - legacy plaintext rows still readable  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Payloads encrypted at rest when keys are configured
//! - Each envelope carries a unique nonce (never reused)
//! - Authenticated encryption (tampering detected)
//! - Key rotation without downtime: decrypt tries every ring key
//! - Undecryptable records degrade to "no credential", never a crash

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod envelope;
mod storage;

pub use envelope::{KeyRing, ENVELOPE_PREFIX};
pub use storage::{StorageError, TokenStore};

/// Credential payload for one external integration.
///
/// The well-known OAuth fields are typed; everything else the provider (or
/// the callback handler) attaches rides along in `extra`, so payload shapes
/// written by older deployments keep round-tripping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Granted scopes as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Validity window in seconds, counted from the record's `stored_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Provider- and callback-specific metadata (team info, echo-back
    /// identity, creation timestamp, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenData {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
            scope: None,
            expires_in: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A token record as read back from the store.
#[derive(Clone, Debug)]
pub struct StoredToken {
    pub data: TokenData,
    /// When the record was last written; expiry counts from here.
    pub stored_at: DateTime<Utc>,
}
