//! Bazaar storefront library.
//!
//! Session carts, checkout, order status changes and review verification,
//! plus the axum routes that expose them. Built as a library so the CLI and
//! the integration tests share the same code as the server binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
