//! Middleware for bearer token validation and authentication
//!
//! Shared by every service that exposes authenticated routes: the API
//! service builds its own `AuthState` and layers `require_auth` the same way.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use marketplace::{
    IdentityStore, MarketError, MarketResult,
    models::{Role, User},
};
use tracing::debug;

use crate::jwt::JwtService;

/// What the authentication middleware needs
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtService,
    pub identity: IdentityStore,
}

/// The authenticated user, as currently stored
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    /// Forbidden unless the user holds at least one of `roles`
    pub fn require_any(&self, roles: &[Role]) -> MarketResult<()> {
        if self.0.has_any_role(roles) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(format!(
                "User {} needs one of the roles: {}",
                self.0.name,
                roles
                    .iter()
                    .map(Role::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}

/// Validate the bearer token and attach the fresh user record to the request
///
/// Unknown or inactive subjects are rejected even with a valid signature.
pub async fn require_auth(
    State(state): State<AuthState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, MarketError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| MarketError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = state.jwt.validate_token(bearer.token()).map_err(|e| {
        debug!("Failed to validate token: {}", e);
        MarketError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let user = state.identity.authenticate(claims.sub).await?;

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}
