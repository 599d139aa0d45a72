use crate::{
    entities::{category, product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Menu catalog: categories and products.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub category_id: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub image_url: Option<Option<String>>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    // Categories

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_category(&self, id: i32) -> Result<category::Model, ServiceError> {
        category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("category {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn create_category(&self, name: String) -> Result<category::Model, ServiceError> {
        let model = category::ActiveModel {
            name: Set(name),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let created = model.insert(&*self.db).await.map_err(dup_to_conflict)?;

        self.event_sender
            .send_or_log(Event::CategoryCreated(created.id))
            .await;
        info!("Created category {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update_category(
        &self,
        id: i32,
        name: String,
    ) -> Result<category::Model, ServiceError> {
        let existing = self.get_category(id).await?;
        let mut active: category::ActiveModel = existing.into();
        active.name = Set(name);
        Ok(active.update(&*self.db).await.map_err(dup_to_conflict)?)
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: i32) -> Result<(), ServiceError> {
        let existing = self.get_category(id).await?;

        let in_use = product::Entity::find()
            .filter(product::Column::CategoryId.eq(id))
            .one(&*self.db)
            .await?
            .is_some();
        if in_use {
            return Err(ServiceError::InvalidOperation(
                "category has products and cannot be deleted".to_string(),
            ));
        }

        existing.delete(&*self.db).await?;
        Ok(())
    }

    // Products

    pub async fn list_products(
        &self,
        category_id: Option<i32>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = product::Entity::find().order_by_asc(product::Column::Name);
        if let Some(category_id) = category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        Ok(query.all(&*self.db).await?)
    }

    pub async fn get_product(&self, id: i32) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", id)))
    }

    /// Fetch a batch of products keyed by id, used by the cart aggregation.
    pub async fn get_products_by_ids(
        &self,
        ids: &[i32],
    ) -> Result<Vec<product::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(product::Entity::find()
            .filter(product::Column::Id.is_in(ids.to_vec()))
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        // The referenced category must exist
        self.get_category(input.category_id).await?;

        let now = Utc::now();
        let model = product::ActiveModel {
            name: Set(input.name),
            price: Set(input.price),
            description: Set(input.description),
            category_id: Set(input.category_id),
            image_url: Set(input.image_url),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        info!("Created product {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: i32,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(id).await?;
        if let Some(category_id) = input.category_id {
            self.get_category(category_id).await?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(image_url);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i32) -> Result<(), ServiceError> {
        let existing = self.get_product(id).await?;
        existing.delete(&*self.db).await?;
        Ok(())
    }
}

/// Map a unique-constraint violation to a conflict the caller can report.
fn dup_to_conflict(err: sea_orm::DbErr) -> ServiceError {
    let text = err.to_string();
    if text.contains("UNIQUE") || text.contains("unique") || text.contains("duplicate") {
        ServiceError::Conflict("name already exists".to_string())
    } else {
        ServiceError::Database(err)
    }
}
