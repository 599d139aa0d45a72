use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::common::{no_content_response, success_response, validate_input},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(upsert_item))
        .route("/items/:id/increase", post(increase_quantity))
        .route("/items/:id/decrease", post(decrease_quantity))
        .route("/items/:id", delete(remove_item))
        .route("/coupon", post(apply_coupon))
        .with_auth()
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertItemRequest {
    pub product_id: i32,
    #[validate(range(min = 1, max = 1000))]
    pub count: i32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    /// An empty code removes the coupon currently on the cart.
    #[serde(default)]
    pub code: String,
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(success_response(cart))
}

async fn upsert_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpsertItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .cart
        .upsert_item(user.user_id, payload.product_id, payload.count)
        .await?;
    Ok(success_response(cart))
}

async fn increase_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .cart
        .increase_quantity(user.user_id, id)
        .await?;
    Ok(success_response(cart))
}

async fn decrease_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .cart
        .decrease_quantity(user.user_id, id)
        .await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let cart = state.services.cart.remove_item(user.user_id, id).await?;
    Ok(success_response(cart))
}

async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .cart
        .apply_coupon(user.user_id, &payload.code)
        .await?;
    Ok(success_response(cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    state.services.cart.clear_cart(user.user_id).await?;
    Ok(no_content_response())
}
