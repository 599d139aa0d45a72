//! Business logic services. Each former SmartMenu microservice maps to
//! one service here; composition replaces the HTTP fan-out.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod recipes;
pub mod users;

pub use cart::{coupon_discount, CartDto, CartService};
pub use catalog::{CatalogService, CreateProductInput, UpdateProductInput};
pub use checkout::{CheckoutOutcome, CheckoutService, ContactDetails};
pub use coupons::{CouponService, CreateCouponInput, UpdateCouponInput};
pub use orders::{OrderDto, OrderService, PaymentSessionDto, Requester};
pub use recipes::{CreateRecipeInput, RecipeService, RecipeWithIngredients, UpdateRecipeInput};
pub use users::UserService;
