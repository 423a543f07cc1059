//! API service routes

use auth::middleware::{AuthUser, require_auth};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{MethodRouter, get, patch, post},
};
use marketplace::{
    MarketError, MarketResult,
    models::{
        Category, DeleteAck, NewCategory, NewProduct, Pagination, Product, Role, UpdateCategory,
        UpdateProduct,
    },
    services::parse_id,
};
use serde_json::json;

use crate::{
    models::{SubscribeCategoryRequest, SubscribeProductRequest},
    state::AppState,
};

const CATALOG_EDITORS: &[Role] = &[Role::Seller, Role::Admin];

/// Create the router for the API service
///
/// Reads are public; every write goes through the bearer token middleware.
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth.clone();
    let authed = move |route: MethodRouter<AppState>| {
        route.route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ))
    };

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/categories",
            get(list_categories).merge(authed(post(create_category))),
        )
        .route("/categories/subscribe", authed(post(subscribe_category)))
        .route(
            "/categories/:term",
            get(find_category).merge(authed(patch(update_category).delete(remove_category))),
        )
        .route(
            "/products",
            get(list_products).merge(authed(post(create_product))),
        )
        .route("/products/subscribe", authed(post(subscribe_product)))
        .route("/products/category/:id", get(products_by_category))
        .route(
            "/products/:id",
            get(find_product).merge(authed(patch(update_product).delete(delete_product))),
        )
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

/// List categories
pub async fn list_categories(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> MarketResult<Json<Vec<Category>>> {
    Ok(Json(state.market.categories.find_all(page).await?))
}

/// Find a category by id, name or slug
pub async fn find_category(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> MarketResult<Json<Category>> {
    Ok(Json(state.market.categories.find_one(&term).await?))
}

/// Create a category (seller or admin)
pub async fn create_category(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Json(payload): Json<NewCategory>,
) -> MarketResult<(StatusCode, Json<Category>)> {
    caller.require_any(CATALOG_EDITORS)?;
    let category = state.market.categories.create(payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Update a category (seller or admin)
pub async fn update_category(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateCategory>,
) -> MarketResult<Json<Category>> {
    caller.require_any(CATALOG_EDITORS)?;
    let id = parse_id(&id)?;
    Ok(Json(state.market.categories.update(id, patch).await?))
}

/// Remove a category (admin)
pub async fn remove_category(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> MarketResult<Json<Category>> {
    caller.require_any(&[Role::Admin])?;
    let id = parse_id(&id)?;
    Ok(Json(state.market.categories.remove(id).await?))
}

/// Subscribe the caller to a category
pub async fn subscribe_category(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(payload): Json<SubscribeCategoryRequest>,
) -> MarketResult<Json<Category>> {
    let category_id = parse_id(&payload.category_id)?;
    Ok(Json(
        state.market.categories.subscribe(category_id, user.id).await?,
    ))
}

/// List products
pub async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> MarketResult<Json<Vec<Product>>> {
    Ok(Json(state.market.products.find_all(page).await?))
}

/// Get a product by id
pub async fn find_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MarketResult<Json<Product>> {
    let id = parse_id(&id)?;
    Ok(Json(state.market.products.find_by_id(id).await?))
}

/// Products tagged with a category
pub async fn products_by_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MarketResult<Json<Vec<Product>>> {
    let id = parse_id(&id)?;
    Ok(Json(state.market.products.find_by_category(id).await?))
}

/// List a product (seller)
pub async fn create_product(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(payload): Json<NewProduct>,
) -> MarketResult<(StatusCode, Json<Product>)> {
    if !user.has_role(Role::Seller) {
        return Err(MarketError::Forbidden(format!(
            "User {} needs the seller role",
            user.name
        )));
    }
    let product = state.market.products.create(payload, user.id).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Owners and admins may change a product
async fn editable_product(
    state: &AppState,
    caller: &AuthUser,
    raw_id: &str,
) -> MarketResult<Product> {
    caller.require_any(CATALOG_EDITORS)?;
    let product = state.market.products.find_by_id(parse_id(raw_id)?).await?;

    let AuthUser(user) = caller;
    if product.owner_id != user.id && !user.has_role(Role::Admin) {
        return Err(MarketError::Forbidden(format!(
            "Product {} belongs to another seller",
            product.id
        )));
    }
    Ok(product)
}

/// Update a product (owner or admin)
pub async fn update_product(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateProduct>,
) -> MarketResult<Json<Product>> {
    let product = editable_product(&state, &caller, &id).await?;
    Ok(Json(
        state.market.products.update_existing(product, patch).await?,
    ))
}

/// Delete a product (owner or admin)
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> MarketResult<Json<DeleteAck>> {
    let product = editable_product(&state, &caller, &id).await?;
    Ok(Json(state.market.products.delete_existing(product).await?))
}

/// Subscribe the caller to a product
pub async fn subscribe_product(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(payload): Json<SubscribeProductRequest>,
) -> MarketResult<Json<Product>> {
    let product_id = parse_id(&payload.product_id)?;
    Ok(Json(
        state.market.products.subscribe(product_id, user.id).await?,
    ))
}
