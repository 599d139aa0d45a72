use crate::{
    entities::coupon,
    errors::ServiceError,
    events::{Event, EventSender},
    payments::PaymentProvider,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Coupon management. Created coupons are mirrored into the payment
/// provider (flat amount off, coupon code as provider id) so hosted
/// checkout sessions can apply them; deletion removes the mirror.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
    currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_amount: Decimal,
    pub min_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCouponInput {
    pub discount_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
}

impl CouponService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            db,
            provider,
            event_sender,
            currency,
        }
    }

    pub async fn list_coupons(&self) -> Result<Vec<coupon::Model>, ServiceError> {
        Ok(coupon::Entity::find()
            .order_by_asc(coupon::Column::Code)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_coupon(&self, id: i32) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("coupon {}", id)))
    }

    /// Case-insensitive lookup by code, as the storefront submits codes
    /// in whatever casing the customer typed.
    pub async fn get_coupon_by_code(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        let normalized = code.trim().to_lowercase();
        let coupons = coupon::Entity::find().all(&*self.db).await?;
        coupons
            .into_iter()
            .find(|c| c.code.to_lowercase() == normalized)
            .ok_or_else(|| ServiceError::NotFound(format!("coupon code {}", code)))
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        if input.discount_amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "discount amount must be positive".to_string(),
            ));
        }

        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(ServiceError::Validation(
                "coupon code must not be empty".to_string(),
            ));
        }

        let exists = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?;
        if exists.is_some() {
            return Err(ServiceError::Conflict(format!(
                "coupon code {} already exists",
                code
            )));
        }

        // Local row first; the provider mirror failing surfaces as an
        // error but never loses the row.
        let created = coupon::ActiveModel {
            code: Set(code.clone()),
            discount_amount: Set(input.discount_amount),
            min_amount: Set(input.min_amount),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        self.provider
            .create_coupon(&created.code, created.discount_amount, &self.currency)
            .await?;

        self.event_sender
            .send_or_log(Event::CouponCreated(created.id))
            .await;
        info!("Created coupon {} ({})", created.id, created.code);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_coupon(
        &self,
        id: i32,
        input: UpdateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        let existing = self.get_coupon(id).await?;
        let mut active: coupon::ActiveModel = existing.into();
        if let Some(discount_amount) = input.discount_amount {
            if discount_amount <= Decimal::ZERO {
                return Err(ServiceError::Validation(
                    "discount amount must be positive".to_string(),
                ));
            }
            active.discount_amount = Set(discount_amount);
        }
        if let Some(min_amount) = input.min_amount {
            active.min_amount = Set(min_amount);
        }
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, id: i32) -> Result<(), ServiceError> {
        let existing = self.get_coupon(id).await?;
        let code = existing.code.clone();

        existing.delete(&*self.db).await?;

        if let Err(e) = self.provider.delete_coupon(&code).await {
            // The local row is already gone; report but do not resurrect
            warn!("provider coupon mirror removal failed for {}: {}", code, e);
            return Err(e);
        }

        self.event_sender
            .send_or_log(Event::CouponDeleted(id))
            .await;
        Ok(())
    }
}
