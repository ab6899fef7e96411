//! Bearer token verification.
//!
//! Two modes: a shared symmetric secret (HS256 only) or a JWKS endpoint
//! (asymmetric, key selected by the token's `kid` header). Issuer and
//! audience are checked exactly when configured, skipped when not.

use super::jwks::JwksCache;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Verified claim set. The subject is mandatory: it is the caller identity
/// everything downstream is keyed by.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verification failures.
///
/// `Expired` and `Invalid` must both collapse to a generic 401 at the HTTP
/// boundary; the distinction exists for logging only. `Configuration` is an
/// operator problem and maps to a 500.
#[derive(Debug)]
pub enum VerifyError {
    /// Signature checked out but the token is past its expiry
    Expired,
    /// Malformed token, bad signature, or claim mismatch
    Invalid(String),
    /// Verifier is missing key material
    Configuration(String),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::Expired => write!(f, "Credential expired"),
            VerifyError::Invalid(msg) => write!(f, "Invalid credential: {}", msg),
            VerifyError::Configuration(msg) => write!(f, "Verifier misconfigured: {}", msg),
        }
    }
}

impl std::error::Error for VerifyError {}

/// How inbound tokens are verified.
pub enum VerifierMode {
    /// HS256 with a shared secret
    SharedSecret(String),
    /// Asymmetric verification against a published key set
    Jwks { url: String, cache: JwksCache },
}

pub struct TokenVerifier {
    mode: VerifierMode,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenVerifier {
    pub fn new(mode: VerifierMode, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            mode,
            issuer,
            audience,
        }
    }

    /// Verifies a raw bearer token and returns its claim set.
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        match &self.mode {
            VerifierMode::SharedSecret(secret) => {
                if secret.is_empty() {
                    return Err(VerifyError::Configuration(
                        "JWT signing secret not configured".to_string(),
                    ));
                }
                let key = DecodingKey::from_secret(secret.as_bytes());
                self.decode_with(token, &key, Algorithm::HS256)
            }
            VerifierMode::Jwks { url, cache } => {
                if url.is_empty() {
                    return Err(VerifyError::Configuration(
                        "JWKS URL not configured".to_string(),
                    ));
                }

                let header = decode_header(token)
                    .map_err(|e| VerifyError::Invalid(format!("Malformed token header: {}", e)))?;
                let kid = header.kid.ok_or_else(|| {
                    VerifyError::Invalid("Token header missing 'kid'".to_string())
                })?;

                let (key, key_alg) = cache.get_key(url, &kid).await.ok_or_else(|| {
                    VerifyError::Invalid(format!("No key matching kid '{}'", kid))
                })?;

                // The key's own declared algorithm wins over the header's
                if let Some(key_alg) = key_alg {
                    if key_alg != header.alg {
                        return Err(VerifyError::Invalid(format!(
                            "Token algorithm {:?} does not match key algorithm {:?}",
                            header.alg, key_alg
                        )));
                    }
                }

                self.decode_with(token, &key, header.alg)
            }
        }
    }

    fn decode_with(
        &self,
        token: &str,
        key: &DecodingKey,
        alg: Algorithm,
    ) -> Result<Claims, VerifyError> {
        let mut validation = Validation::new(alg);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let decoded = decode::<Claims>(token, key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => VerifyError::Expired,
                _ => VerifyError::Invalid(e.to_string()),
            }
        })?;

        Ok(decoded.claims)
    }
}
