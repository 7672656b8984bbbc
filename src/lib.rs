//! Pricewright
//!
//! Pricewright is the pricing and discount-eligibility layer of a storefront. It decides which
//! discount rules apply to a cart, what they are worth, what a line's unit price is once tier
//! and customer-group pricing is taken into account, and whether two cart lines describe the
//! same purchasable configuration.

pub mod actions;
pub mod cart;
pub mod catalog;
pub mod conditions;
pub mod context;
pub mod currency;
pub mod engine;
pub mod fields;
pub mod fixtures;
pub mod legacy;
pub mod prelude;
pub mod settings;
pub mod tiers;
pub mod utils;
