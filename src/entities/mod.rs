//! Sea-ORM entity definitions for the SmartMenu schema.

pub mod cart_detail;
pub mod cart_header;
pub mod category;
pub mod checkout_attempt;
pub mod coupon;
pub mod ingredient;
pub mod order_detail;
pub mod order_header;
pub mod product;
pub mod recipe;
pub mod recipe_ingredient;
pub mod user;

pub use order_header::OrderStatus;
pub use user::UserRole;
