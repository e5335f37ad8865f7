// gateway-auth-rs/src/jwt.rs
//
// HS256 bearer tokens. The gate only checks the signature and, when the
// token carries one, the expiry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error_response;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidScheme,

    #[error("Invalid authentication token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("JWT secret must not be empty")]
    EmptySecret,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        error_response(StatusCode::UNAUTHORIZED, self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Identity of a caller that passed the gate, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub subject: Option<String>,
}

pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // exp is enforced only when present
        validation.required_spec_claims.clear();

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims)
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

/// Sign an HS256 token for `subject`, expiring after `ttl` when given.
/// Used by operators to mint service tokens and by tests.
pub fn issue_token(secret: &str, subject: &str, ttl: Option<Duration>) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::EmptySecret);
    }

    let exp = ttl.map(|ttl| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (now + ttl).as_secs()
    });
    let claims = Claims {
        sub: Some(subject.to_string()),
        exp,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let token = issue_token("s3cret", "front-end", Some(Duration::from_secs(60))).unwrap();
        let claims = JwtVerifier::new("s3cret").unwrap().verify(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("front-end"));
        assert!(claims.exp.is_some());
    }

    #[test]
    fn token_without_exp_is_accepted() {
        let token = issue_token("s3cret", "svc", None).unwrap();
        assert!(JwtVerifier::new("s3cret").unwrap().verify(&token).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("one", "svc", None).unwrap();
        assert!(matches!(
            JwtVerifier::new("two").unwrap().verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: Some("svc".into()),
            exp: Some(1_000),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        assert!(JwtVerifier::new("s3cret").unwrap().verify(&token).is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(JwtVerifier::new(""), Err(AuthError::EmptySecret)));
    }
}
