use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::user::{self, UserRole},
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, validate_input},
    services::users::{RegisterUserInput, UpdateAccountInput},
    AppState,
};

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login));

    let authenticated = Router::new()
        .route("/me", get(me).put(update_account))
        .route("/change-password", post(change_password))
        .with_auth();

    let admin = Router::new()
        .route("/assign-role", post(assign_role))
        .with_role(UserRole::Admin);

    public.merge(authenticated).merge(admin)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub phone: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserView,
    pub token: String,
}

/// Public projection of an account, without the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: uuid::Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

impl From<user::Model> for UserView {
    fn from(m: user::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            name: m.name,
            phone: m.phone,
            role: m.role,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRoleRequest {
    #[validate(email)]
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    /// Absent leaves the phone untouched; an explicit null clears it.
    #[serde(default, deserialize_with = "nested_option")]
    pub phone: Option<Option<String>>,
}

fn nested_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let user = state
        .services
        .users
        .register(RegisterUserInput {
            email: payload.email,
            name: payload.name,
            phone: payload.phone,
            password: payload.password,
            role: payload.role,
        })
        .await?;
    Ok(created_response(UserView::from(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let (user, token) = state
        .services
        .users
        .login(&payload.email, &payload.password)
        .await?;
    Ok(success_response(LoginResponse {
        user: UserView::from(user),
        token,
    }))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Response, ServiceError> {
    let account = state.services.users.get_user(user.user_id).await?;
    Ok(success_response(UserView::from(account)))
}

async fn update_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let updated = state
        .services
        .users
        .update_account(
            user.user_id,
            UpdateAccountInput {
                name: payload.name,
                phone: payload.phone,
            },
        )
        .await?;
    Ok(success_response(UserView::from(updated)))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    state
        .services
        .users
        .change_password(user.user_id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(no_content_response())
}

async fn assign_role(
    State(state): State<AppState>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let updated = state
        .services
        .users
        .assign_role(&payload.email, payload.role)
        .await?;
    Ok(success_response(UserView::from(updated)))
}
