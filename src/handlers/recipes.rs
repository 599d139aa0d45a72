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
    services::{CreateRecipeInput, UpdateRecipeInput},
    AppState,
};

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_recipes))
        .route("/:id", get(get_recipe));

    let admin = Router::new()
        .route("/", post(create_recipe))
        .route("/:id", put(update_recipe))
        .route("/:id", delete(delete_recipe))
        .with_role(UserRole::Admin);

    public.merge(admin)
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < dec!(1) || *price > dec!(1000) {
        return Err(ValidationError::new("price must be between 1 and 1000"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecipeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(length(max = 2000))]
    pub description: String,
    pub category_id: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecipeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category_id: Option<i32>,
    #[serde(default, deserialize_with = "nested_option")]
    pub image_url: Option<Option<String>>,
    pub ingredients: Option<Vec<String>>,
}

fn nested_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct RecipeListQuery {
    pub category_id: Option<i32>,
}

async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeListQuery>,
) -> Result<Response, ServiceError> {
    let recipes = state
        .services
        .recipes
        .list_recipes(query.category_id)
        .await?;
    Ok(success_response(recipes))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let recipe = state.services.recipes.get_recipe(id).await?;
    Ok(success_response(recipe))
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(payload): Json<CreateRecipeRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let recipe = state
        .services
        .recipes
        .create_recipe(CreateRecipeInput {
            name: payload.name,
            price: payload.price,
            description: payload.description,
            category_id: payload.category_id,
            image_url: payload.image_url,
            ingredients: payload.ingredients,
        })
        .await?;
    Ok(created_response(recipe))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateRecipeRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let recipe = state
        .services
        .recipes
        .update_recipe(
            id,
            UpdateRecipeInput {
                name: payload.name,
                price: payload.price,
                description: payload.description,
                category_id: payload.category_id,
                image_url: payload.image_url,
                ingredients: payload.ingredients,
            },
        )
        .await?;
    Ok(success_response(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.recipes.delete_recipe(id).await?;
    Ok(no_content_response())
}
