//! HTTP layer. Handlers stay thin: deserialize, validate, call the
//! matching service, wrap the result in the response envelope.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    auth::AuthService,
    config::AppConfig,
    events::EventSender,
    payments::PaymentProvider,
    services::{
        CartService, CatalogService, CheckoutService, CouponService, OrderService, RecipeService,
        UserService,
    },
};

pub mod auth;
pub mod carts;
pub mod categories;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod recipes;

/// Shared service instances handed to every handler through app state.
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
    pub recipes: Arc<RecipeService>,
    pub coupons: Arc<CouponService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let users = Arc::new(UserService::new(
            db.clone(),
            auth_service,
            event_sender.clone(),
        ));
        let catalog = Arc::new(CatalogService::new(db.clone(), event_sender.clone()));
        let recipes = Arc::new(RecipeService::new(db.clone(), event_sender.clone()));
        let coupons = Arc::new(CouponService::new(
            db.clone(),
            provider.clone(),
            event_sender.clone(),
            config.payment_currency.clone(),
        ));
        let cart = Arc::new(CartService::new(
            db.clone(),
            catalog.clone(),
            coupons.clone(),
            event_sender.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            provider,
            event_sender.clone(),
            config.checkout_return_url.clone(),
            config.checkout_cancel_url.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(db, orders.clone(), event_sender));

        Self {
            users,
            catalog,
            recipes,
            coupons,
            cart,
            orders,
            checkout,
        }
    }
}
