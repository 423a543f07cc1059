//! Authentication service
//!
//! Registration, login and account management over HTTP, plus the bearer
//! token middleware reused by the other services.

pub mod jwt;
pub mod middleware;
pub mod rate_limiter;
pub mod routes;

use marketplace::IdentityStore;

use crate::{jwt::JwtService, middleware::AuthState, rate_limiter::RateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityStore,
    pub jwt: JwtService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
            identity: self.identity.clone(),
        }
    }
}
