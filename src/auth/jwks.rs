//! JWKS fetching and caching for asymmetric token verification.
//!
//! Key sets are cached per endpoint URL with a TTL (default one hour). A
//! refetch failure keeps serving the last good key set rather than clearing
//! it, so transient provider outages don't invalidate every inbound token.
//! Concurrent refreshes are tolerated: last writer wins, which is harmless
//! for a read-mostly key set.

use dashmap::DashMap;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default cache lifetime for a fetched key set.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(3600);

struct CachedKeys {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Cache of JSON Web Key Sets, keyed by endpoint URL.
pub struct JwksCache {
    client: reqwest::Client,
    entries: DashMap<String, CachedKeys>,
    ttl: Duration,
}

impl JwksCache {
    /// The client should carry a request timeout; a hung JWKS endpoint must
    /// not hang token verification.
    pub fn new(client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            client,
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Looks up the decoding key for `kid`, fetching or refreshing the key
    /// set when the cache is empty or older than the TTL.
    ///
    /// Returns `None` when no key matches, including the case where the
    /// endpoint has never been fetched successfully, which leaves an empty
    /// key set until a fetch succeeds.
    pub async fn get_key(
        &self,
        jwks_url: &str,
        kid: &str,
    ) -> Option<(DecodingKey, Option<Algorithm>)> {
        let fresh = self
            .entries
            .get(jwks_url)
            .map(|e| e.fetched_at.elapsed() < self.ttl)
            .unwrap_or(false);

        if !fresh {
            match self.fetch(jwks_url).await {
                Ok(jwks) => {
                    debug!(url = %jwks_url, keys = jwks.keys.len(), "Fetched JWKS");
                    self.entries.insert(
                        jwks_url.to_string(),
                        CachedKeys {
                            jwks,
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    if self.entries.contains_key(jwks_url) {
                        // Stale-but-available beats unavailable
                        warn!(url = %jwks_url, error = %e, "JWKS refetch failed, serving stale key set");
                    } else {
                        warn!(url = %jwks_url, error = %e, "JWKS fetch failed and no cached key set exists");
                        return None;
                    }
                }
            }
        }

        let entry = self.entries.get(jwks_url)?;
        let jwk = entry
            .jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))?;

        match DecodingKey::from_jwk(jwk) {
            Ok(key) => Some((key, jwk_algorithm(jwk))),
            Err(e) => {
                warn!(url = %jwks_url, kid = %kid, error = %e, "JWKS key could not be converted");
                None
            }
        }
    }

    async fn fetch(&self, jwks_url: &str) -> Result<JwkSet, reqwest::Error> {
        let response = self
            .client
            .get(jwks_url)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?;

        response.json::<JwkSet>().await
    }
}

/// Algorithm declared on the JWK itself, if any. Verification restricts the
/// token's header algorithm to this one when present.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    use jsonwebtoken::jwk::KeyAlgorithm;

    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
