//! Bearer tokens for test users.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use transfat_api::auth::JwtClaims;
use uuid::Uuid;

use super::TEST_JWT_SECRET;

pub fn token_for(user_id: Uuid) -> String {
    token_with_expiry(user_id, 3600)
}

/// `exp_offset` seconds from now; negative for an expired token.
pub fn token_with_expiry(user_id: Uuid, exp_offset: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id,
        exp: now + exp_offset,
        iat: Some(now),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
