use super::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

const SECRET: &str = "unit-test-secret";

fn shared_secret_verifier() -> TokenVerifier {
    TokenVerifier::new(
        VerifierMode::SharedSecret(SECRET.to_string()),
        None,
        None,
    )
}

fn signed_token(sub: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "sub": sub,
        "iat": now,
        "exp": now + 3600,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod extract_bearer_token_tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn valid_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());

        let result = extract_bearer_token(&headers);
        assert_eq!(result.unwrap(), "abc.def.ghi");
    }

    #[test]
    fn valid_bearer_token_with_extra_whitespace() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer   abc.def.ghi  ".parse().unwrap());

        let result = extract_bearer_token(&headers);
        assert_eq!(result.unwrap(), "abc.def.ghi");
    }

    #[test]
    fn case_insensitive_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "bearer abc.def.ghi".parse().unwrap());

        let result = extract_bearer_token(&headers);
        assert_eq!(result.unwrap(), "abc.def.ghi");
    }

    #[test]
    fn missing_authorization_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), Err(TokenError::Missing));
    }

    #[test]
    fn wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());

        assert_eq!(
            extract_bearer_token(&headers),
            Err(TokenError::InvalidFormat)
        );
    }

    #[test]
    fn no_token_after_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer ".parse().unwrap());

        assert_eq!(extract_bearer_token(&headers), Err(TokenError::Empty));
    }

    #[test]
    fn bare_token_without_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "abc.def.ghi".parse().unwrap());

        assert_eq!(
            extract_bearer_token(&headers),
            Err(TokenError::InvalidFormat)
        );
    }
}

#[cfg(test)]
mod authenticate_tests {
    use super::*;
    use axum::http::HeaderMap;

    #[tokio::test]
    async fn bearer_token_sets_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            format!("Bearer {}", signed_token("alice")).parse().unwrap(),
        );

        let identity = authenticate(&headers, &shared_secret_verifier(), &HeaderAuth::default())
            .await
            .unwrap();

        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.provenance, Provenance::Bearer);
    }

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let headers = HeaderMap::new();

        let result =
            authenticate(&headers, &shared_secret_verifier(), &HeaderAuth::default()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn garbage_token_is_unauthenticated() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer not.a.jwt".parse().unwrap());

        let result =
            authenticate(&headers, &shared_secret_verifier(), &HeaderAuth::default()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn trusted_header_when_enabled() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", "bob".parse().unwrap());

        let header_auth = HeaderAuth {
            enabled: true,
            header_name: "x-forwarded-user".to_string(),
        };

        let identity = authenticate(&headers, &shared_secret_verifier(), &header_auth)
            .await
            .unwrap();

        assert_eq!(identity.subject, "bob");
        assert_eq!(identity.provenance, Provenance::TrustedHeader);
    }

    #[tokio::test]
    async fn trusted_header_ignored_when_disabled() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", "bob".parse().unwrap());

        // Disabled (the default): header alone does not authenticate
        let result =
            authenticate(&headers, &shared_secret_verifier(), &HeaderAuth::default()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn bearer_still_works_with_header_auth_enabled() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            format!("Bearer {}", signed_token("carol")).parse().unwrap(),
        );

        let header_auth = HeaderAuth {
            enabled: true,
            header_name: "x-forwarded-user".to_string(),
        };

        let identity = authenticate(&headers, &shared_secret_verifier(), &header_auth)
            .await
            .unwrap();

        assert_eq!(identity.subject, "carol");
        assert_eq!(identity.provenance, Provenance::Bearer);
    }
}
