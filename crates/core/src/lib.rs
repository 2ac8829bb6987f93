#![warn(clippy::all, missing_docs)]

//! Core domain logic for the shoptui storefront simulator.
//!
//! This crate hosts the data models, configuration handling, credential
//! validation, catalog discovery/watching, the cart/inventory engine and
//! the flat-file persistence layers used by the terminal UI.

pub mod accounts;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod models;
pub mod receipts;
pub mod session;
pub mod validators;

pub use accounts::AccountStore;
pub use cart::{Cart, CartError};
pub use catalog::{CatalogEvent, CatalogLoader, CatalogWatcher};
pub use config::AppConfig;
pub use models::{Account, CartItem, Product, Receipt};
pub use receipts::ReceiptStore;
pub use session::{Session, SessionError};
