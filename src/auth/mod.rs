//! Request authentication: bearer extraction, token verification, identity.
//!
//! Handlers call [`authenticate`] with the inbound headers; on success they
//! get the caller [`Identity`] for the rest of the request. Verification
//! failures never escape this module as panics; they become [`AuthError`]
//! values the API layer maps to HTTP statuses.

use axum::http::HeaderMap;

pub mod jwks;
pub mod verifier;

#[cfg(test)]
mod tests;

pub use jwks::{JwksCache, DEFAULT_JWKS_TTL};
pub use verifier::{Claims, TokenVerifier, VerifierMode, VerifyError};

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    // Expect "Bearer <token>"
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    // Check scheme is "Bearer"
    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Invalid format (not "Bearer <token>")
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}

/// How the caller identity was established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Subject claim of a signature-verified bearer token
    Bearer,
    /// Asserted by a trusted perimeter header; no signature was checked
    TrustedHeader,
}

/// The verified caller identity for one request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub subject: String,
    pub provenance: Provenance,
}

/// Authentication failures, already shaped for the HTTP boundary: the
/// detail strings are for logs, never for response bodies.
#[derive(Debug)]
pub enum AuthError {
    /// Missing, malformed, expired, or unverifiable credential (HTTP 401)
    Unauthenticated(String),
    /// Verifier misconfiguration (HTTP 500)
    Configuration(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            AuthError::Configuration(msg) => write!(f, "Auth configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Trusted-header escape hatch. Off by default; enabling it reduces the
/// security guarantee to perimeter trust, since the named header substitutes
/// for signature verification.
#[derive(Clone, Debug)]
pub struct HeaderAuth {
    pub enabled: bool,
    pub header_name: String,
}

impl Default for HeaderAuth {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: "x-forwarded-user".to_string(),
        }
    }
}

/// Establishes the caller identity for a request.
///
/// When header auth is enabled and the trusted header is present, its value
/// becomes the identity with [`Provenance::TrustedHeader`]. Otherwise the
/// bearer token is extracted and verified, and the claim set's subject
/// becomes the identity.
pub async fn authenticate(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
    header_auth: &HeaderAuth,
) -> Result<Identity, AuthError> {
    if header_auth.enabled {
        if let Some(value) = headers.get(header_auth.header_name.as_str()) {
            let subject = value
                .to_str()
                .map_err(|_| {
                    AuthError::Unauthenticated("Trusted header is not valid UTF-8".to_string())
                })?
                .trim();
            if !subject.is_empty() {
                tracing::debug!(subject = %subject, "Identity asserted by trusted header");
                return Ok(Identity {
                    subject: subject.to_string(),
                    provenance: Provenance::TrustedHeader,
                });
            }
        }
    }

    let token =
        extract_bearer_token(headers).map_err(|e| AuthError::Unauthenticated(e.to_string()))?;

    let claims = verifier.verify(&token).await.map_err(|e| match e {
        VerifyError::Configuration(msg) => AuthError::Configuration(msg),
        other => AuthError::Unauthenticated(other.to_string()),
    })?;

    Ok(Identity {
        subject: claims.sub,
        provenance: Provenance::Bearer,
    })
}
