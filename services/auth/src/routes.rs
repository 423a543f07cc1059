//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use marketplace::{
    MarketError, MarketResult,
    models::{LoginCredentials, NewUser, Pagination, Role, SellerProfile, UpdateUser, User},
    services::parse_id,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{AppState, middleware::{AuthUser, require_auth}};

/// Response for user login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth", put(update_me))
        .route("/auth/seller", post(become_seller))
        .route("/auth/info", get(my_info))
        .route("/auth/users", get(list_users))
        .route("/auth/users/:name", get(users_by_name))
        .route("/auth/:id", delete(deactivate_user))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// User registration endpoint
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> MarketResult<(StatusCode, Json<User>)> {
    let user = state.identity.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginCredentials>,
) -> MarketResult<Json<LoginResponse>> {
    let key = payload.email.trim().to_lowercase();
    info!("Login attempt for user: {}", key);

    state.rate_limiter.check(&key).await?;

    let user = match state.identity.login(payload).await {
        Ok(user) => user,
        Err(e @ MarketError::Unauthorized(_)) => {
            state.rate_limiter.record_failure(&key).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    state.rate_limiter.reset(&key).await;

    let token = state.jwt.generate_access_token(&user).map_err(|e| {
        error!("Failed to generate access token: {}", e);
        MarketError::Internal(e.to_string())
    })?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        email: user.email,
        token,
    }))
}

/// Become a seller
pub async fn become_seller(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(profile): Json<SellerProfile>,
) -> MarketResult<Json<User>> {
    Ok(Json(state.identity.become_seller(user.id, profile).await?))
}

/// Current user
pub async fn my_info(Extension(AuthUser(user)): Extension<AuthUser>) -> Json<User> {
    Json(user)
}

/// Update the current user
pub async fn update_me(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(patch): Json<UpdateUser>,
) -> MarketResult<Json<User>> {
    Ok(Json(state.identity.update(user.id, patch).await?))
}

/// List users (admin)
pub async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Query(page): Query<Pagination>,
) -> MarketResult<Json<Vec<User>>> {
    caller.require_any(&[Role::Admin])?;
    Ok(Json(state.identity.find_all(page).await?))
}

/// Users with an exact name (admin)
pub async fn users_by_name(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(name): Path<String>,
    Query(page): Query<Pagination>,
) -> MarketResult<Json<Vec<User>>> {
    caller.require_any(&[Role::Admin])?;
    Ok(Json(state.identity.find_by_name(&name, page).await?))
}

/// Deactivate a user (admin)
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> MarketResult<Json<User>> {
    caller.require_any(&[Role::Admin])?;
    let id = parse_id(&id)?;
    Ok(Json(state.identity.deactivate(id).await?))
}
