use crate::auth::models::{JwtClaims, UserContext};
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use transfat_core::AppError;

#[derive(Clone)]
pub struct AuthState {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthState {
    pub fn new(jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Verify signature and expiry and return the claims.
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AppError> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        AppError::Unauthorized("Token has expired".to_string())
                    }
                    ErrorKind::InvalidSignature => {
                        AppError::Unauthorized("Invalid token signature".to_string())
                    }
                    _ => AppError::Unauthorized("Invalid or expired token".to_string()),
                }
            })
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return HttpAppError(AppError::Unauthorized(
            "Missing or invalid Authorization header".to_string(),
        ))
        .into_response();
    };

    let claims = match auth_state.validate_token(token) {
        Ok(claims) => claims,
        Err(e) => return HttpAppError(e).into_response(),
    };

    request.extensions_mut().insert(UserContext {
        user_id: claims.sub,
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    const SECRET: &str = "test-secret-test-secret-test-secret";

    fn token(secret: &str, sub: Uuid, exp_offset: i64) -> String {
        let claims = JwtClaims {
            sub,
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_subject() {
        let user = Uuid::new_v4();
        let claims = AuthState::new(SECRET)
            .validate_token(&token(SECRET, user, 300))
            .unwrap();
        assert_eq!(claims.sub, user);
    }

    #[test]
    fn expired_token_is_rejected() {
        let err = AuthState::new(SECRET)
            .validate_token(&token(SECRET, Uuid::new_v4(), -300))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Token has expired");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = "another-secret-another-secret-1234";
        assert!(AuthState::new(SECRET)
            .validate_token(&token(other, Uuid::new_v4(), 300))
            .is_err());
    }
}
