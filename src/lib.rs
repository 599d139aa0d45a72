//! SmartMenu API: a consolidated food-ordering backend covering the
//! catalog, recipes, coupons, carts, checkout, orders, and accounts.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use serde::Serialize;

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod payments;
pub mod services;

pub use config::AppConfig;
pub use errors::ServiceError;
pub use handlers::AppServices;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub services: AppServices,
    pub event_sender: Arc<events::EventSender>,
    pub auth_service: Arc<auth::AuthService>,
}

/// Uniform response envelope for every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Build the full route tree. Auth middleware layers are attached per
/// sub-router, so the caller only supplies the state.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", handlers::auth::routes())
        .nest("/api/categories", handlers::categories::routes())
        .nest("/api/products", handlers::products::routes())
        .nest("/api/recipes", handlers::recipes::routes())
        .nest("/api/coupons", handlers::coupons::routes())
        .nest("/api/cart", handlers::carts::routes())
        .nest("/api/orders", handlers::orders::routes())
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    match db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            }))),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("database unreachable")),
        ),
    }
}
