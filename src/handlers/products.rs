use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::{
    auth::AuthRouterExt,
    entities::UserRole,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, validate_input},
    services::{CreateProductInput, UpdateProductInput},
    AppState,
};

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product));

    let admin = Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product))
        .route("/:id", delete(delete_product))
        .with_role(UserRole::Admin);

    public.merge(admin)
}

/// Listed prices must stay within the menu range.
fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < dec!(1) || *price > dec!(1000) {
        return Err(ValidationError::new("price must be between 1 and 1000"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(length(max = 2000))]
    pub description: String,
    pub category_id: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category_id: Option<i32>,
    #[serde(default, deserialize_with = "nested_option")]
    pub image_url: Option<Option<String>>,
}

/// Distinguishes an omitted `image_url` (leave unchanged) from an explicit
/// `null` (clear the stored value).
fn nested_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub category_id: Option<i32>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Response, ServiceError> {
    let products = state
        .services
        .catalog
        .list_products(query.category_id)
        .await?;
    Ok(success_response(products))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(success_response(product))
}

async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .create_product(CreateProductInput {
            name: payload.name,
            price: payload.price,
            description: payload.description,
            category_id: payload.category_id,
            image_url: payload.image_url,
        })
        .await?;
    Ok(created_response(product))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .update_product(
            id,
            UpdateProductInput {
                name: payload.name,
                price: payload.price,
                description: payload.description,
                category_id: payload.category_id,
                image_url: payload.image_url,
            },
        )
        .await?;
    Ok(success_response(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.catalog.delete_product(id).await?;
    Ok(no_content_response())
}
