use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::AuthRouterExt,
    entities::UserRole,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, validate_input},
    AppState,
};

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_categories))
        .route("/:id", get(get_category));

    let admin = Router::new()
        .route("/", post(create_category))
        .route("/:id", put(update_category))
        .route("/:id", delete(delete_category))
        .with_role(UserRole::Admin);

    public.merge(admin)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(success_response(categories))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let category = state.services.catalog.get_category(id).await?;
    Ok(success_response(category))
}

async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let category = state.services.catalog.create_category(payload.name).await?;
    Ok(created_response(category))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CategoryRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let category = state
        .services
        .catalog
        .update_category(id, payload.name)
        .await?;
    Ok(success_response(category))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.catalog.delete_category(id).await?;
    Ok(no_content_response())
}
