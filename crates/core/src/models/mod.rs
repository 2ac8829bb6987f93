//! Shared domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered storefront account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique login name, ASCII alphanumeric.
    pub username: String,
    /// Unique contact address, stored lowercase.
    pub email: String,
    /// Hex-encoded SHA-256 digest of the password.
    pub password_hash: String,
    /// Wallet balance, never negative.
    pub balance: f64,
}

/// A catalog entry loaded from the warehouse files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Sequential identifier assigned at load time.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: f64,
    /// Units still available, after cart reservations.
    pub stock: u32,
}

impl Product {
    /// Whether at least one unit can still be reserved.
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A reserved line in the shopping cart.
///
/// Name and price are snapshots taken when the line was created, so a
/// receipt reflects what the shopper actually saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Identifier of the reserved product.
    pub product_id: u32,
    /// Units reserved out of the product's stock.
    pub quantity: u32,
    /// Product name at the time the line was added.
    pub name: String,
    /// Unit price at the time the line was added.
    pub price: f64,
}

impl CartItem {
    /// Price of the whole line.
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// Record of a completed checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction identifier, `TXN<unix-seconds>`.
    pub id: String,
    /// Account the purchase was charged to.
    pub username: String,
    /// Cart lines as they were at checkout.
    pub items: Vec<CartItem>,
    /// Amount deducted from the wallet.
    pub total: f64,
    /// Wallet balance after the deduction.
    pub balance_after: f64,
    /// Timestamp of the checkout.
    pub created_at: DateTime<Utc>,
}
