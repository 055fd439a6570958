//! Bazaar Core - shared domain types.
//!
//! This crate provides the types used across all Bazaar components:
//! - `storefront` - Cart, checkout, orders and reviews (library + HTTP binary)
//! - `cli` - Migrations, review reconciliation and order administration
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP. Money arithmetic and the order status state machine live
//! here so every consumer computes totals and transitions the same way.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, prices, tax rates, ratings, order numbers and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
