use crate::{
    entities::{cart_detail, cart_header, coupon, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{catalog::CatalogService, coupons::CouponService},
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// The cart is stored as a header row (one per user) plus one detail row
/// per product. Totals and the coupon discount are transient: every read
/// recomputes them from the detail rows, the current product prices and
/// the coupon table. Mutations run in a single transaction so concurrent
/// upserts of the same product cannot lose an update.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    coupons: Arc<CouponService>,
    event_sender: Arc<EventSender>,
}

/// One line of the aggregated cart view.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemDto {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub price: Decimal,
    pub count: i32,
    pub line_total: Decimal,
}

/// Aggregated cart view returned to clients. `cart_header_id` is `None`
/// for a user who has never put anything in a cart.
#[derive(Debug, Clone, Serialize)]
pub struct CartDto {
    pub cart_header_id: Option<i32>,
    pub user_id: Uuid,
    pub coupon_code: Option<String>,
    pub discount: Decimal,
    pub cart_total: Decimal,
    pub items: Vec<CartItemDto>,
}

impl CartDto {
    fn empty(user_id: Uuid) -> Self {
        Self {
            cart_header_id: None,
            user_id,
            coupon_code: None,
            discount: Decimal::ZERO,
            cart_total: Decimal::ZERO,
            items: Vec::new(),
        }
    }
}

/// Discount a coupon grants for a given pre-discount total. The coupon
/// applies only when the total strictly exceeds its minimum.
pub fn coupon_discount(total: Decimal, coupon: Option<&coupon::Model>) -> Decimal {
    match coupon {
        Some(c) if total > c.min_amount => c.discount_amount,
        _ => Decimal::ZERO,
    }
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        coupons: Arc<CouponService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            coupons,
            event_sender,
        }
    }

    /// Aggregated cart read: header + details joined with products,
    /// total computed as `Σ(count × price)` and the coupon applied when
    /// the total clears its minimum.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartDto, ServiceError> {
        let header = match self.find_header(user_id).await? {
            Some(header) => header,
            None => return Ok(CartDto::empty(user_id)),
        };

        let details = cart_detail::Entity::find()
            .filter(cart_detail::Column::CartHeaderId.eq(header.id))
            .all(&*self.db)
            .await?;

        let product_ids: Vec<i32> = details.iter().map(|d| d.product_id).collect();
        let products: HashMap<i32, product::Model> = self
            .catalog
            .get_products_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut items = Vec::with_capacity(details.len());
        let mut total = Decimal::ZERO;
        for detail in &details {
            let product = products.get(&detail.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("product {}", detail.product_id))
            })?;
            let line_total = product.price * Decimal::from(detail.count);
            total += line_total;
            items.push(CartItemDto {
                id: detail.id,
                product_id: detail.product_id,
                product_name: product.name.clone(),
                price: product.price,
                count: detail.count,
                line_total,
            });
        }

        // A stale code on the header silently grants no discount; any
        // other lookup failure propagates
        let coupon = match &header.coupon_code {
            Some(code) => match self.coupons.get_coupon_by_code(code).await {
                Ok(coupon) => Some(coupon),
                Err(ServiceError::NotFound(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        let discount = coupon_discount(total, coupon.as_ref());

        Ok(CartDto {
            cart_header_id: Some(header.id),
            user_id,
            coupon_code: header.coupon_code,
            discount,
            cart_total: total - discount,
            items,
        })
    }

    /// Add a product to the cart, or bump the count of an existing line
    /// by the submitted amount. Creates the header on first use.
    #[instrument(skip(self))]
    pub async fn upsert_item(
        &self,
        user_id: Uuid,
        product_id: i32,
        count: i32,
    ) -> Result<CartDto, ServiceError> {
        if count < 1 {
            return Err(ServiceError::Validation(
                "count must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))?;

        let header = cart_header::Entity::find()
            .filter(cart_header::Column::UserId.eq(user_id))
            .one(&txn)
            .await?;
        let header = match header {
            Some(header) => header,
            None => {
                cart_header::ActiveModel {
                    user_id: Set(user_id),
                    coupon_code: Set(None),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        let existing = cart_detail::Entity::find()
            .filter(cart_detail::Column::CartHeaderId.eq(header.id))
            .filter(cart_detail::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(detail) => {
                let new_count = detail.count + count;
                let mut active: cart_detail::ActiveModel = detail.into();
                active.count = Set(new_count);
                active.update(&txn).await?;
            }
            None => {
                cart_detail::ActiveModel {
                    cart_header_id: Set(header.id),
                    product_id: Set(product_id),
                    count: Set(count),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
        }

        txn.commit().await?;
        self.event_sender
            .send_or_log(Event::CartUpdated { user_id })
            .await;
        self.get_cart(user_id).await
    }

    /// Increment a line's count by exactly one.
    #[instrument(skip(self))]
    pub async fn increase_quantity(
        &self,
        user_id: Uuid,
        cart_detail_id: i32,
    ) -> Result<CartDto, ServiceError> {
        let (detail, _header) = self.owned_detail(user_id, cart_detail_id).await?;
        let new_count = detail.count + 1;
        let mut active: cart_detail::ActiveModel = detail.into();
        active.count = Set(new_count);
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartUpdated { user_id })
            .await;
        self.get_cart(user_id).await
    }

    /// Decrement a line's count by exactly one; the count never drops
    /// below one (remove the line instead).
    #[instrument(skip(self))]
    pub async fn decrease_quantity(
        &self,
        user_id: Uuid,
        cart_detail_id: i32,
    ) -> Result<CartDto, ServiceError> {
        let (detail, _header) = self.owned_detail(user_id, cart_detail_id).await?;
        if detail.count <= 1 {
            return Err(ServiceError::Validation(
                "quantity cannot go below 1; remove the item instead".to_string(),
            ));
        }
        let new_count = detail.count - 1;
        let mut active: cart_detail::ActiveModel = detail.into();
        active.count = Set(new_count);
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartUpdated { user_id })
            .await;
        self.get_cart(user_id).await
    }

    /// Remove a line; removing the last line deletes the header too.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        cart_detail_id: i32,
    ) -> Result<CartDto, ServiceError> {
        let (detail, header) = self.owned_detail(user_id, cart_detail_id).await?;

        let txn = self.db.begin().await?;
        let header_id = header.id;
        detail.delete(&txn).await?;

        let remaining = cart_detail::Entity::find()
            .filter(cart_detail::Column::CartHeaderId.eq(header_id))
            .one(&txn)
            .await?;
        if remaining.is_none() {
            header.delete(&txn).await?;
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated { user_id })
            .await;
        self.get_cart(user_id).await
    }

    /// Store a coupon code on the cart. An empty code clears the stored
    /// coupon without validation; a non-empty code must exist and the
    /// current cart total must meet its minimum. At exactly the minimum
    /// the coupon is accepted but grants no discount.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: Uuid, code: &str) -> Result<CartDto, ServiceError> {
        let header = self
            .find_header(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("cart".to_string()))?;

        let trimmed = code.trim();
        if trimmed.is_empty() {
            let mut active: cart_header::ActiveModel = header.into();
            active.coupon_code = Set(None);
            active.update(&*self.db).await?;
            return self.get_cart(user_id).await;
        }

        let coupon = match self.coupons.get_coupon_by_code(trimmed).await {
            Ok(coupon) => coupon,
            Err(ServiceError::NotFound(_)) => {
                return Err(ServiceError::Validation("Invalid coupon code.".to_string()))
            }
            Err(e) => return Err(e),
        };

        // Validate against the pre-discount total of the current cart
        let cart = self.current_total(header.id).await?;
        if cart < coupon.min_amount {
            return Err(ServiceError::Validation(format!(
                "cart total must be at least {} for this coupon",
                coupon.min_amount
            )));
        }

        let mut active: cart_header::ActiveModel = header.into();
        active.coupon_code = Set(Some(coupon.code.clone()));
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartUpdated { user_id })
            .await;
        self.get_cart(user_id).await
    }

    /// Drop every line and the header. Succeeds when no cart exists.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let header = match self.find_header(user_id).await? {
            Some(header) => header,
            None => return Ok(()),
        };

        let txn = self.db.begin().await?;
        cart_detail::Entity::delete_many()
            .filter(cart_detail::Column::CartHeaderId.eq(header.id))
            .exec(&txn)
            .await?;
        header.delete(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared { user_id })
            .await;
        info!("Cleared cart for user {}", user_id);
        Ok(())
    }

    async fn find_header(
        &self,
        user_id: Uuid,
    ) -> Result<Option<cart_header::Model>, ServiceError> {
        Ok(cart_header::Entity::find()
            .filter(cart_header::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// Load a detail row and verify it belongs to the caller's cart.
    async fn owned_detail(
        &self,
        user_id: Uuid,
        cart_detail_id: i32,
    ) -> Result<(cart_detail::Model, cart_header::Model), ServiceError> {
        let detail = cart_detail::Entity::find_by_id(cart_detail_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart item {}", cart_detail_id)))?;

        let header = cart_header::Entity::find_by_id(detail.cart_header_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("cart".to_string()))?;

        if header.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "cart item belongs to another user".to_string(),
            ));
        }
        Ok((detail, header))
    }

    /// Pre-discount total of a cart, recomputed from rows and prices.
    async fn current_total(&self, header_id: i32) -> Result<Decimal, ServiceError> {
        let details = cart_detail::Entity::find()
            .filter(cart_detail::Column::CartHeaderId.eq(header_id))
            .all(&*self.db)
            .await?;
        let product_ids: Vec<i32> = details.iter().map(|d| d.product_id).collect();
        let products: HashMap<i32, Decimal> = self
            .catalog
            .get_products_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.price))
            .collect();

        let mut total = Decimal::ZERO;
        for detail in &details {
            let price = products.get(&detail.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("product {}", detail.product_id))
            })?;
            total += *price * Decimal::from(detail.count);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn coupon(discount: Decimal, min: Decimal) -> coupon::Model {
        coupon::Model {
            id: 1,
            code: "10OFF".into(),
            discount_amount: discount,
            min_amount: min,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_coupon_means_no_discount() {
        assert_eq!(coupon_discount(dec!(100), None), Decimal::ZERO);
    }

    // The minimum is a strict threshold: equal totals get nothing
    #[rstest]
    #[case(dec!(100), dec!(10), dec!(50), dec!(10))]
    #[case(dec!(50.01), dec!(10), dec!(50), dec!(10))]
    #[case(dec!(50), dec!(10), dec!(50), Decimal::ZERO)]
    #[case(dec!(49.99), dec!(10), dec!(50), Decimal::ZERO)]
    #[case(dec!(100.01), dec!(5), dec!(100), dec!(5))]
    fn discount_applies_strictly_above_minimum(
        #[case] total: Decimal,
        #[case] discount: Decimal,
        #[case] min: Decimal,
        #[case] expected: Decimal,
    ) {
        let c = coupon(discount, min);
        assert_eq!(coupon_discount(total, Some(&c)), expected);
    }
}
