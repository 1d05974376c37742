//! Bearer token verification.
//!
//! Issuing credentials is somebody else's job (a login service, or the
//! `token` subcommand during development); all the server needs is to turn
//! an `Authorization: Bearer <token>` header into a verified [`Owner`].

use crate::AppState;
use crate::error::{ApiError, ErrorKind, Result};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use cirrus_storage::Owner;
use exn::ResultExt;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;

/// Turns a presented credential into the owner it belongs to.
pub trait Authenticator: Send + Sync {
    /// Returns `None` for anything that isn't a valid credential.
    fn verify(&self, token: &str) -> Option<Owner>;
}

pub type AuthHandle = Arc<dyn Authenticator + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    email: String,
    exp: u64,
}

/// HMAC-SHA256 signed JSON Web Tokens carrying the owner in an `email` claim.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}
impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Signs a token for `email` that expires after `ttl`.
    pub fn issue(&self, email: &str, ttl: Duration) -> Result<String> {
        Owner::new(email).or_raise(|| ErrorKind::Token)?;
        let now = u64::try_from(UtcDateTime::now().unix_timestamp()).or_raise(|| ErrorKind::Token)?;
        let claims = Claims { email: email.to_string(), exp: now + ttl.as_secs() };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).or_raise(|| ErrorKind::Token)
    }
}
impl Authenticator for JwtAuthenticator {
    fn verify(&self, token: &str) -> Option<Owner> {
        let claims = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                tracing::debug!(error = %err, "Rejected token");
                return None;
            },
        };
        match Owner::new(claims.email) {
            Ok(owner) => Some(owner),
            Err(err) => {
                tracing::warn!(error = ?err, "Token is valid but its email can't be used as an owner");
                None
            },
        }
    }
}

/// The verified owner of the current request.
///
/// Extracting this is what makes a handler require authentication: no
/// header is a 401, anything else that doesn't verify is a 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub Owner);

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).ok_or(ApiError::Unauthorized)?;
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Forbidden)?;
        state.auth.verify(token).map(Principal).ok_or(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_issue_and_verify() {
        let auth = JwtAuthenticator::new("s3cret");
        let token = auth.issue("alice@example.com", HOUR).unwrap();
        assert_eq!(auth.verify(&token), Some(Owner::new("alice@example.com").unwrap()));
    }

    #[test]
    fn test_wrong_secret() {
        let token = JwtAuthenticator::new("one").issue("alice@example.com", HOUR).unwrap();
        assert_eq!(JwtAuthenticator::new("two").verify(&token), None);
    }

    #[test]
    fn test_expired() {
        let auth = JwtAuthenticator::new("s3cret");
        let claims = Claims { email: "alice@example.com".to_string(), exp: 1_000_000 };
        let token = encode(&Header::default(), &claims, &auth.encoding).unwrap();
        assert_eq!(auth.verify(&token), None);
    }

    #[test]
    fn test_garbage() {
        let auth = JwtAuthenticator::new("s3cret");
        assert_eq!(auth.verify("not.a.token"), None);
        assert_eq!(auth.verify(""), None);
    }

    #[test]
    fn test_unusable_owner() {
        let auth = JwtAuthenticator::new("s3cret");
        assert!(auth.issue("../escape", HOUR).is_err());
        let claims = Claims { email: "../escape".to_string(), exp: u64::MAX / 2 };
        let token = encode(&Header::default(), &claims, &auth.encoding).unwrap();
        assert_eq!(auth.verify(&token), None);
    }
}
