use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::OrderStatus,
    errors::ServiceError,
    handlers::common::{created_response, success_response, validate_input},
    services::{ContactDetails, Requester},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/session", post(create_session))
        .route("/:id/validate", post(validate_session))
        .route("/:id/status", put(update_status))
        .with_auth()
}

fn requester(user: &AuthUser) -> Requester {
    Requester {
        user_id: user.user_id,
        is_admin: user.is_admin(),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub phone: String,
    #[validate(email)]
    pub email: String,
    /// Optional client-supplied key; a fresh one is generated when absent.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .checkout
        .place_order(
            user.user_id,
            ContactDetails {
                name: payload.name,
                phone: payload.phone,
                email: payload.email,
            },
            payload.idempotency_key,
        )
        .await?;
    if outcome.replayed {
        Ok(success_response(outcome))
    } else {
        Ok(created_response(outcome))
    }
}

async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Response, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders(requester(&user), query.status)
        .await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id, requester(&user)).await?;
    Ok(success_response(order))
}

async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let session = state
        .services
        .orders
        .create_session(id, requester(&user))
        .await?;
    Ok(success_response(session))
}

async fn validate_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .validate_session(id, requester(&user))
        .await?;
    Ok(success_response(order))
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(id, payload.status, requester(&user))
        .await?;
    Ok(success_response(order))
}
