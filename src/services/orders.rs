use crate::{
    entities::{order_detail, order_header, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{to_minor_units, CreateSessionRequest, PaymentProvider, SessionLineItem},
};
use once_cell::sync::Lazy;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Caller identity as seen by the order service. Admins see and touch
/// every order; customers only their own.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub user_id: Uuid,
    pub is_admin: bool,
}

/// Order with its captured lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDto {
    #[serde(flatten)]
    pub header: order_header::Model,
    pub details: Vec<order_detail::Model>,
}

/// Hosted payment session handed to the client for redirect.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSessionDto {
    pub order_id: i32,
    pub session_id: String,
    pub session_url: String,
}

/// Legal status transitions for non-admin callers. Admins may override.
static ALLOWED_TRANSITIONS: Lazy<HashMap<OrderStatus, &'static [OrderStatus]>> = Lazy::new(|| {
    use OrderStatus::*;
    let mut map: HashMap<OrderStatus, &'static [OrderStatus]> = HashMap::new();
    map.insert(Pending, &[Approved, Cancelled]);
    map.insert(Approved, &[ReadyForPickup, Cancelled]);
    map.insert(ReadyForPickup, &[Completed]);
    map.insert(Cancelled, &[Refunded]);
    map.insert(Completed, &[]);
    map.insert(Refunded, &[]);
    map
});

pub fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    ALLOWED_TRANSITIONS
        .get(&from)
        .map(|targets| targets.contains(&to))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
    approved_url: String,
    cancel_url: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        approved_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            db,
            provider,
            event_sender,
            approved_url,
            cancel_url,
        }
    }

    pub async fn get_order(
        &self,
        order_id: i32,
        requester: Requester,
    ) -> Result<OrderDto, ServiceError> {
        let header = self.load_owned_header(order_id, requester).await?;
        let details = order_detail::Entity::find()
            .filter(order_detail::Column::OrderHeaderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(OrderDto { header, details })
    }

    /// Newest first; optional status filter.
    pub async fn list_orders(
        &self,
        requester: Requester,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderDto>, ServiceError> {
        let mut query = order_header::Entity::find().order_by_desc(order_header::Column::Id);
        if !requester.is_admin {
            query = query.filter(order_header::Column::UserId.eq(requester.user_id));
        }
        if let Some(status) = status {
            query = query.filter(order_header::Column::Status.eq(status));
        }
        let headers = query.all(&*self.db).await?;

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let details = order_detail::Entity::find()
                .filter(order_detail::Column::OrderHeaderId.eq(header.id))
                .all(&*self.db)
                .await?;
            orders.push(OrderDto { header, details });
        }
        Ok(orders)
    }

    /// Ask the provider for a hosted checkout session over the order's
    /// captured lines and store the session id on the order.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        order_id: i32,
        requester: Requester,
    ) -> Result<PaymentSessionDto, ServiceError> {
        let header = self.load_owned_header(order_id, requester).await?;
        if header.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot create a payment session for a {} order",
                header.status
            )));
        }

        let details = order_detail::Entity::find()
            .filter(order_detail::Column::OrderHeaderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let mut line_items = Vec::with_capacity(details.len());
        for detail in &details {
            line_items.push(SessionLineItem {
                name: detail.product_name.clone(),
                unit_amount_cents: to_minor_units(detail.price)?,
                quantity: detail.count as i64,
            });
        }

        let coupon_code = if header.discount > rust_decimal::Decimal::ZERO {
            header.coupon_code.clone()
        } else {
            None
        };

        let session = self
            .provider
            .create_checkout_session(&CreateSessionRequest {
                reference: order_id.to_string(),
                line_items,
                coupon_code,
                approved_url: self.approved_url.clone(),
                cancel_url: self.cancel_url.clone(),
            })
            .await?;

        let mut active: order_header::ActiveModel = header.into();
        active.session_id = Set(Some(session.id.clone()));
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentSessionCreated {
                order_id,
                session_id: session.id.clone(),
            })
            .await;

        Ok(PaymentSessionDto {
            order_id,
            session_id: session.id,
            session_url: session.url,
        })
    }

    /// Check the provider-side session and approve the order when paid.
    /// An unpaid session leaves the order untouched.
    #[instrument(skip(self))]
    pub async fn validate_session(
        &self,
        order_id: i32,
        requester: Requester,
    ) -> Result<OrderDto, ServiceError> {
        let header = self.load_owned_header(order_id, requester).await?;
        let session_id = header
            .session_id
            .clone()
            .ok_or_else(|| ServiceError::InvalidOperation("order has no payment session".into()))?;

        let status = self.provider.retrieve_session(&session_id).await?;

        if status.paid && header.status == OrderStatus::Pending {
            let old_status = header.status;
            let mut active: order_header::ActiveModel = header.into();
            active.payment_intent_id = Set(status.payment_intent_id);
            active.status = Set(OrderStatus::Approved);
            active.update(&*self.db).await?;

            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.to_string(),
                    new_status: OrderStatus::Approved.to_string(),
                })
                .await;
            info!("Order {} approved after payment", order_id);
        }

        self.get_order(order_id, requester).await
    }

    /// Move an order along its lifecycle. Non-admin callers are held to
    /// the transition table; admins may force any target status.
    /// Cancelling a paid order also refunds the payment intent and
    /// records the order as refunded.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i32,
        new_status: OrderStatus,
        requester: Requester,
    ) -> Result<OrderDto, ServiceError> {
        let header = self.load_owned_header(order_id, requester).await?;
        let old_status = header.status;

        if old_status == new_status {
            return self.get_order(order_id, requester).await;
        }

        if !requester.is_admin && !transition_allowed(old_status, new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot move an order from {} to {}",
                old_status, new_status
            )));
        }

        let mut final_status = new_status;
        if new_status == OrderStatus::Cancelled {
            if let Some(payment_intent_id) = header.payment_intent_id.clone() {
                self.provider.refund(&payment_intent_id).await?;
                final_status = OrderStatus::Refunded;
                self.event_sender
                    .send_or_log(Event::OrderRefunded(order_id))
                    .await;
            }
        }

        let mut active: order_header::ActiveModel = header.into();
        active.status = Set(final_status);
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: final_status.to_string(),
            })
            .await;
        info!("Order {}: {} -> {}", order_id, old_status, final_status);

        self.get_order(order_id, requester).await
    }

    async fn load_owned_header(
        &self,
        order_id: i32,
        requester: Requester,
    ) -> Result<order_header::Model, ServiceError> {
        let header = order_header::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))?;

        if !requester.is_admin && header.user_id != requester.user_id {
            warn!(
                "user {} attempted to access order {} owned by {}",
                requester.user_id, order_id, header.user_id
            );
            return Err(ServiceError::Forbidden(
                "order belongs to another user".to_string(),
            ));
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn pending_can_be_approved_or_cancelled() {
        assert!(transition_allowed(Pending, Approved));
        assert!(transition_allowed(Pending, Cancelled));
        assert!(!transition_allowed(Pending, Completed));
        assert!(!transition_allowed(Pending, ReadyForPickup));
    }

    #[test]
    fn completed_and_refunded_are_terminal() {
        for target in [Pending, Approved, ReadyForPickup, Cancelled, Refunded] {
            assert!(!transition_allowed(Completed, target));
        }
        for target in [Pending, Approved, ReadyForPickup, Cancelled, Completed] {
            assert!(!transition_allowed(Refunded, target));
        }
    }

    #[test]
    fn cancelled_may_only_be_refunded() {
        assert!(transition_allowed(Cancelled, Refunded));
        assert!(!transition_allowed(Cancelled, Pending));
        assert!(!transition_allowed(Cancelled, Approved));
    }

    #[test]
    fn no_backwards_transitions() {
        assert!(!transition_allowed(Approved, Pending));
        assert!(!transition_allowed(ReadyForPickup, Approved));
    }
}
