//! Bearer token authentication
//!
//! Tokens are HS256 JWTs issued elsewhere; this service only verifies them.

pub mod middleware;
pub mod models;

pub use middleware::{auth_middleware, AuthState};
pub use models::{JwtClaims, UserContext};
