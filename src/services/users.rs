use crate::{
    auth::AuthService,
    entities::user::{self, UserRole},
    errors::ServiceError,
    events::{Event, EventSender},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Account management: registration, login, role assignment.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserInput {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAccountInput {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            auth,
            event_sender,
        }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterUserInput) -> Result<user::Model, ServiceError> {
        let email = input.email.trim().to_lowercase();

        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "email {} is already registered",
                email
            )));
        }

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            name: Set(input.name),
            phone: Set(input.phone),
            password_hash: Set(hash_password(&input.password)?),
            role: Set(input.role.unwrap_or(UserRole::Customer)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(created.id))
            .await;
        info!("Registered user {}", created.id);
        Ok(created)
    }

    /// Verify credentials and mint a token. Unknown emails and wrong
    /// passwords produce the same error.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(user::Model, String), ServiceError> {
        let normalized = email.trim().to_lowercase();
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(normalized))
            .one(&*self.db)
            .await?;

        let user = match user {
            Some(u) if verify_password(password, &u.password_hash) => u,
            _ => {
                return Err(ServiceError::Unauthorized(
                    "invalid email or password".to_string(),
                ))
            }
        };

        let token = self
            .auth
            .generate_token(&user)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        Ok((user, token))
    }

    #[instrument(skip(self))]
    pub async fn assign_role(
        &self,
        email: &str,
        role: UserRole,
    ) -> Result<user::Model, ServiceError> {
        let normalized = email.trim().to_lowercase();
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", normalized)))?;

        let user_id = user.id;
        let mut active: user::ActiveModel = user.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::RoleAssigned {
                user_id,
                role: role.to_string(),
            })
            .await;
        Ok(updated)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))
    }

    #[instrument(skip(self, input))]
    pub async fn update_account(
        &self,
        user_id: Uuid,
        input: UpdateAccountInput,
    ) -> Result<user::Model, ServiceError> {
        let user = self.get_user(user_id).await?;
        let mut active: user::ActiveModel = user.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(phone);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Change the caller's password after verifying the current one.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let user = self.get_user(user_id).await?;
        if !verify_password(current_password, &user.password_hash) {
            return Err(ServiceError::Unauthorized(
                "current password is incorrect".to_string(),
            ));
        }

        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(new_password)?);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }
}
