use crate::{
    entities::{
        cart_detail, cart_header, checkout_attempt, coupon, order_detail, order_header, product,
        OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::coupon_discount, orders::OrderService, orders::Requester},
};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Order placement.
///
/// Placement is exactly-once: each attempt carries an idempotency key,
/// and the order rows, the captured lines, the idempotency ledger entry
/// and the cart deletion all commit in one transaction. Replaying a key
/// returns the order created by the first attempt. The payment session
/// is requested only after the commit; if the provider call fails the
/// order stays `Pending` and a session can be requested again later.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    orders: Arc<OrderService>,
    event_sender: Arc<EventSender>,
}

/// Contact details captured onto the order header.
#[derive(Debug, Clone)]
pub struct ContactDetails {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Result of a placement: the order plus, when the provider call
/// succeeded, the hosted session to redirect the buyer to.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order_id: i32,
    pub status: OrderStatus,
    pub order_total: Decimal,
    pub discount: Decimal,
    pub session_id: Option<String>,
    pub session_url: Option<String>,
    /// True when the idempotency key matched a previous attempt
    pub replayed: bool,
}

fn generate_idempotency_key() -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("chk_{}", suffix)
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: Arc<OrderService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            orders,
            event_sender,
        }
    }

    /// Place an order from the caller's current cart.
    #[instrument(skip(self, contact), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        contact: ContactDetails,
        idempotency_key: Option<String>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let key = idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(generate_idempotency_key);

        // Replay check outside the transaction: the common case is a
        // fresh key and the ledger row is unique-keyed anyway.
        if let Some(outcome) = self.replay_for_key(&key, user_id).await? {
            return Ok(outcome);
        }

        let txn = self.db.begin().await?;

        let header = match cart_header::Entity::find()
            .filter(cart_header::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            Some(header) => header,
            // A missing cart can mean a concurrent attempt with the same
            // key committed first and consumed it
            None => {
                txn.rollback().await?;
                return self
                    .replay_for_key(&key, user_id)
                    .await?
                    .ok_or_else(|| ServiceError::Validation("cart is empty".to_string()));
            }
        };

        let details = cart_detail::Entity::find()
            .filter(cart_detail::Column::CartHeaderId.eq(header.id))
            .all(&txn)
            .await?;
        if details.is_empty() {
            return Err(ServiceError::Validation("cart is empty".to_string()));
        }

        let product_ids: Vec<i32> = details.iter().map(|d| d.product_id).collect();
        let products: HashMap<i32, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut total = Decimal::ZERO;
        for detail in &details {
            let product = products.get(&detail.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("product {}", detail.product_id))
            })?;
            total += product.price * Decimal::from(detail.count);
        }

        let applied_coupon = match &header.coupon_code {
            Some(code) => {
                let all = coupon::Entity::find().all(&txn).await?;
                let normalized = code.to_lowercase();
                all.into_iter().find(|c| c.code.to_lowercase() == normalized)
            }
            None => None,
        };
        let discount = coupon_discount(total, applied_coupon.as_ref());

        let order = order_header::ActiveModel {
            user_id: Set(user_id),
            coupon_code: Set(applied_coupon.as_ref().map(|c| c.code.clone())),
            discount: Set(discount),
            order_total: Set(total - discount),
            name: Set(contact.name),
            phone: Set(contact.phone),
            email: Set(contact.email),
            order_time: Set(Utc::now()),
            status: Set(OrderStatus::Pending),
            payment_intent_id: Set(None),
            session_id: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for detail in &details {
            let product = &products[&detail.product_id];
            order_detail::ActiveModel {
                order_header_id: Set(order.id),
                product_id: Set(detail.product_id),
                product_name: Set(product.name.clone()),
                price: Set(product.price),
                count: Set(detail.count),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        let ledger_insert = checkout_attempt::ActiveModel {
            key: Set(key.clone()),
            user_id: Set(user_id),
            order_header_id: Set(order.id),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await;
        if let Err(e) = ledger_insert {
            // A concurrent attempt with the same key won the race between
            // our replay check and this insert
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                txn.rollback().await?;
                return self.replay_for_key(&key, user_id).await?.ok_or_else(|| {
                    ServiceError::Conflict(
                        "idempotency key is already being processed".to_string(),
                    )
                });
            }
            return Err(e.into());
        }

        // Cart clearing commits with the order: a placed order always
        // leaves an empty cart behind.
        cart_detail::Entity::delete_many()
            .filter(cart_detail::Column::CartHeaderId.eq(header.id))
            .exec(&txn)
            .await?;
        cart_header::Entity::delete_by_id(header.id).exec(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        self.event_sender
            .send_or_log(Event::CartCleared { user_id })
            .await;
        info!("Placed order {} for user {}", order.id, user_id);

        // Session after commit; a provider failure never rolls back the
        // order or resurrects the cart.
        let requester = Requester {
            user_id,
            is_admin: false,
        };
        let (session_id, session_url) = match self.orders.create_session(order.id, requester).await
        {
            Ok(session) => (Some(session.session_id), Some(session.session_url)),
            Err(e) => {
                warn!("payment session creation failed for order {}: {}", order.id, e);
                (None, None)
            }
        };

        Ok(CheckoutOutcome {
            order_id: order.id,
            status: OrderStatus::Pending,
            order_total: order.order_total,
            discount: order.discount,
            session_id,
            session_url,
            replayed: false,
        })
    }

    /// Look up a previous attempt for the key. Replays belong to the key's
    /// original user; anyone else gets a conflict.
    async fn replay_for_key(
        &self,
        key: &str,
        user_id: Uuid,
    ) -> Result<Option<CheckoutOutcome>, ServiceError> {
        let previous = checkout_attempt::Entity::find_by_id(key.to_string())
            .one(&*self.db)
            .await?;
        match previous {
            Some(previous) if previous.user_id != user_id => Err(ServiceError::Conflict(
                "idempotency key was used by another user".to_string(),
            )),
            Some(previous) => {
                info!(
                    "Replayed checkout key for user {}, order {}",
                    user_id, previous.order_header_id
                );
                Ok(Some(
                    self.outcome_for_existing(previous.order_header_id, user_id)
                        .await?,
                ))
            }
            None => Ok(None),
        }
    }

    async fn outcome_for_existing(
        &self,
        order_id: i32,
        user_id: Uuid,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let order = self
            .orders
            .get_order(
                order_id,
                Requester {
                    user_id,
                    is_admin: false,
                },
            )
            .await?;
        Ok(CheckoutOutcome {
            order_id: order.header.id,
            status: order.header.status,
            order_total: order.header.order_total,
            discount: order.header.discount,
            session_id: order.header.session_id.clone(),
            session_url: None,
            replayed: true,
        })
    }
}
