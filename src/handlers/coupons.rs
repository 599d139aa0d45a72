use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::AuthRouterExt,
    entities::UserRole,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, validate_input},
    services::{CreateCouponInput, UpdateCouponInput},
    AppState,
};

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_coupons))
        .route("/:id", get(get_coupon))
        .route("/code/:code", get(get_coupon_by_code));

    let admin = Router::new()
        .route("/", post(create_coupon))
        .route("/:id", put(update_coupon))
        .route("/:id", delete(delete_coupon))
        .with_role(UserRole::Admin);

    public.merge(admin)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub discount_amount: Decimal,
    pub min_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCouponRequest {
    pub discount_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
}

async fn list_coupons(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let coupons = state.services.coupons.list_coupons().await?;
    Ok(success_response(coupons))
}

async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.get_coupon(id).await?;
    Ok(success_response(coupon))
}

async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.get_coupon_by_code(&code).await?;
    Ok(success_response(coupon))
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let coupon = state
        .services
        .coupons
        .create_coupon(CreateCouponInput {
            code: payload.code,
            discount_amount: payload.discount_amount,
            min_amount: payload.min_amount,
        })
        .await?;
    Ok(created_response(coupon))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCouponRequest>,
) -> Result<Response, ServiceError> {
    let coupon = state
        .services
        .coupons
        .update_coupon(
            id,
            UpdateCouponInput {
                discount_amount: payload.discount_amount,
                min_amount: payload.min_amount,
            },
        )
        .await?;
    Ok(success_response(coupon))
}

async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.coupons.delete_coupon(id).await?;
    Ok(no_content_response())
}
