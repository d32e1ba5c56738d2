use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use bson::oid::ObjectId;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

/// Bearer token claims; `sub` carries the user's email
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// Issue a signed token for the given email, valid for the configured TTL
pub fn issue_token(email: &str, secret: &str, ttl_hours: i64) -> Result<String, ApiError> {
    let claims = Claims {
        sub: email.to_string(),
        exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Token encoding failed: {}", e);
        ApiError::Internal
    })
}

/// Decode and validate a token, returning the subject email
pub fn verify_token(token: &str, secret: &str) -> Result<String, ApiError> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Ok(data.claims.sub)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
        tracing::error!("Password hashing failed: {}", e);
        ApiError::Internal
    })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Authenticated caller, resolved from the Authorization header.
///
/// Expired or malformed tokens, and tokens whose subject no longer exists,
/// all reject with 401 before the handler runs.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: ObjectId,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let email = verify_token(token, &state.config.jwt_secret)?;

        let user = state
            .persist
            .users()
            .find_by_email(&email)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(CurrentUser {
            id: user.id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let token = issue_token("amine@example.com", "test-secret", 24).unwrap();
        let subject = verify_token(&token, "test-secret").unwrap();
        assert_eq!(subject, "amine@example.com");
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = issue_token("amine@example.com", "test-secret", 24).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("amine@example.com", "test-secret", -1).unwrap();
        assert!(verify_token(&token, "test-secret").is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("v4lves!").unwrap();
        assert!(verify_password("v4lves!", &hash));
        assert!(!verify_password("wrench", &hash));
    }
}
