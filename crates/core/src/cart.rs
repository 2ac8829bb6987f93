//! Shopping cart with stock reservation.
//!
//! Every unit in the cart is reserved out of the catalog: for any product,
//! cart quantity plus remaining stock always equals the stock at load time.
//! Removing or shrinking a line hands units back; checkout drains the lines
//! without returning anything, because those units have left the warehouse.

use thiserror::Error;
use tracing::debug;

use crate::{catalog::CatalogLoader, models::CartItem};

/// Failures of cart operations.
#[derive(Debug, Error, PartialEq)]
pub enum CartError {
    /// The requested product does not exist in the catalog.
    #[error("product {0} is not in the catalog")]
    UnknownProduct(u32),
    /// The product has no stock left to reserve.
    #[error("{0} is out of stock")]
    OutOfStock(String),
    /// The cart has no line at the given position.
    #[error("no cart item at position {0}")]
    InvalidIndex(usize),
    /// Quantities must stay positive; removal is a separate operation.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    /// The requested increase exceeds what is left in stock.
    #[error("only {available} more in stock")]
    InsufficientStock {
        /// Units still available in the catalog.
        available: u32,
    },
}

/// Ordered cart lines for the signed-in shopper.
#[derive(Debug, Default)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lines in insertion order.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Number of lines (not units).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart holds no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of line totals.
    pub fn total(&self) -> f64 {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Reserve one unit of a product, growing an existing line or appending
    /// a new one with a name/price snapshot.
    pub fn add(&mut self, catalog: &CatalogLoader, product_id: u32) -> Result<CartItem, CartError> {
        let product = catalog
            .product(product_id)
            .ok_or(CartError::UnknownProduct(product_id))?;
        if !catalog.take_stock(product_id, 1) {
            return Err(CartError::OutOfStock(product.name));
        }

        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
        {
            item.quantity += 1;
            return Ok(item.clone());
        }

        let item = CartItem {
            product_id,
            quantity: 1,
            name: product.name,
            price: product.price,
        };
        self.items.push(item.clone());
        Ok(item)
    }

    /// Set the quantity of the line at `index`, adjusting the catalog stock
    /// by the signed difference.
    pub fn update_quantity(
        &mut self,
        catalog: &CatalogLoader,
        index: usize,
        quantity: u32,
    ) -> Result<CartItem, CartError> {
        let item = self
            .items
            .get(index)
            .ok_or(CartError::InvalidIndex(index))?;
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let product = catalog
            .product(item.product_id)
            .ok_or(CartError::UnknownProduct(item.product_id))?;
        let current = item.quantity;

        if quantity > current {
            let needed = quantity - current;
            if !catalog.take_stock(item.product_id, needed) {
                return Err(CartError::InsufficientStock {
                    available: product.stock,
                });
            }
        } else if quantity < current {
            catalog.restore_stock(item.product_id, current - quantity);
        }

        let item = &mut self.items[index];
        item.quantity = quantity;
        Ok(item.clone())
    }

    /// Drop the line at `index`, returning its full quantity to stock.
    pub fn remove(&mut self, catalog: &CatalogLoader, index: usize) -> Result<CartItem, CartError> {
        if index >= self.items.len() {
            return Err(CartError::InvalidIndex(index));
        }
        let item = self.items.remove(index);
        catalog.restore_stock(item.product_id, item.quantity);
        Ok(item)
    }

    /// Empty the cart, returning every reservation to stock. Returns the
    /// number of lines released.
    pub fn clear(&mut self, catalog: &CatalogLoader) -> usize {
        for item in &self.items {
            catalog.restore_stock(item.product_id, item.quantity);
        }
        let released = self.items.len();
        self.items.clear();
        released
    }

    /// Take the lines for a completed checkout without releasing stock;
    /// the reserved units have been sold.
    pub fn drain_checked_out(&mut self) -> Vec<CartItem> {
        std::mem::take(&mut self.items)
    }

    /// Re-attach lines to a freshly reloaded catalog.
    ///
    /// Lines are matched by name since ids are reassigned at load. Matched
    /// lines adopt the new id and re-reserve their quantity out of the fresh
    /// stock, clamped to what is available; lines whose product vanished are
    /// dropped. Returns the number of dropped lines.
    pub fn reattach(&mut self, catalog: &CatalogLoader) -> usize {
        let mut dropped = 0;
        self.items.retain_mut(|item| match catalog.find_by_name(&item.name) {
            Some(fresh) => {
                let take = item.quantity.min(fresh.stock);
                if take == 0 {
                    dropped += 1;
                    return false;
                }
                if take < item.quantity {
                    debug!(
                        name = %item.name,
                        wanted = item.quantity,
                        take,
                        "cart line clamped to fresh stock"
                    );
                    item.quantity = take;
                }
                item.product_id = fresh.id;
                catalog.take_stock(fresh.id, take);
                true
            }
            None => {
                dropped += 1;
                false
            }
        });
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn fixture(content: &str, default_stock: u32) -> Result<(TempDir, CatalogLoader)> {
        let dir = tempdir()?;
        fs::write(dir.path().join("warehouse.txt"), content)?;
        let loader = CatalogLoader::new(dir.path(), default_stock);
        loader.reload()?;
        Ok((dir, loader))
    }

    fn reserved_plus_stock(cart: &Cart, catalog: &CatalogLoader, id: u32) -> u32 {
        let reserved: u32 = cart
            .items()
            .iter()
            .filter(|item| item.product_id == id)
            .map(|item| item.quantity)
            .sum();
        reserved + catalog.product(id).map(|product| product.stock).unwrap_or(0)
    }

    #[test]
    fn add_reserves_stock_and_merges_lines() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500;Keyboard:12000", 3)?;
        let mut cart = Cart::new();

        let item = cart.add(&catalog, 1)?;
        assert_eq!(item.quantity, 1);
        let item = cart.add(&catalog, 1)?;
        assert_eq!(item.quantity, 2);
        cart.add(&catalog, 2)?;

        assert_eq!(cart.len(), 2);
        assert_eq!(catalog.product(1).unwrap().stock, 1);
        assert_eq!(reserved_plus_stock(&cart, &catalog, 1), 3);
        Ok(())
    }

    #[test]
    fn add_fails_on_unknown_or_exhausted_products() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500", 1)?;
        let mut cart = Cart::new();

        assert_eq!(cart.add(&catalog, 9), Err(CartError::UnknownProduct(9)));
        cart.add(&catalog, 1)?;
        assert_eq!(
            cart.add(&catalog, 1),
            Err(CartError::OutOfStock("Mouse".to_string()))
        );
        Ok(())
    }

    #[test]
    fn update_quantity_adjusts_by_difference() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500", 5)?;
        let mut cart = Cart::new();
        cart.add(&catalog, 1)?;

        let item = cart.update_quantity(&catalog, 0, 4)?;
        assert_eq!(item.quantity, 4);
        assert_eq!(catalog.product(1).unwrap().stock, 1);

        let item = cart.update_quantity(&catalog, 0, 2)?;
        assert_eq!(item.quantity, 2);
        assert_eq!(catalog.product(1).unwrap().stock, 3);
        assert_eq!(reserved_plus_stock(&cart, &catalog, 1), 5);
        Ok(())
    }

    #[test]
    fn update_quantity_validates_input() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500", 3)?;
        let mut cart = Cart::new();
        cart.add(&catalog, 1)?;

        assert_eq!(
            cart.update_quantity(&catalog, 5, 1),
            Err(CartError::InvalidIndex(5))
        );
        assert_eq!(
            cart.update_quantity(&catalog, 0, 0),
            Err(CartError::ZeroQuantity)
        );
        assert_eq!(
            cart.update_quantity(&catalog, 0, 4),
            Err(CartError::InsufficientStock { available: 2 })
        );
        // failed update leaves everything untouched
        assert_eq!(cart.items()[0].quantity, 1);
        assert_eq!(catalog.product(1).unwrap().stock, 2);
        Ok(())
    }

    #[test]
    fn remove_restores_full_quantity() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500;Keyboard:12000", 4)?;
        let mut cart = Cart::new();
        cart.add(&catalog, 1)?;
        cart.update_quantity(&catalog, 0, 3)?;
        cart.add(&catalog, 2)?;

        let removed = cart.remove(&catalog, 0)?;
        assert_eq!(removed.name, "Mouse");
        assert_eq!(catalog.product(1).unwrap().stock, 4);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.remove(&catalog, 7), Err(CartError::InvalidIndex(7)));
        Ok(())
    }

    #[test]
    fn clear_releases_everything() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500;Keyboard:12000", 4)?;
        let mut cart = Cart::new();
        cart.add(&catalog, 1)?;
        cart.update_quantity(&catalog, 0, 2)?;
        cart.add(&catalog, 2)?;

        assert_eq!(cart.clear(&catalog), 2);
        assert!(cart.is_empty());
        assert_eq!(catalog.product(1).unwrap().stock, 4);
        assert_eq!(catalog.product(2).unwrap().stock, 4);
        Ok(())
    }

    #[test]
    fn total_sums_price_snapshots() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500;Keyboard:12000", 4)?;
        let mut cart = Cart::new();
        assert_eq!(cart.total(), 0.0);
        cart.add(&catalog, 1)?;
        cart.update_quantity(&catalog, 0, 2)?;
        cart.add(&catalog, 2)?;
        assert_eq!(cart.total(), 2.0 * 4500.0 + 12000.0);
        Ok(())
    }

    #[test]
    fn drain_keeps_stock_reserved() -> Result<()> {
        let (_dir, catalog) = fixture("Mouse:4500", 4)?;
        let mut cart = Cart::new();
        cart.add(&catalog, 1)?;
        cart.add(&catalog, 1)?;

        let items = cart.drain_checked_out();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert!(cart.is_empty());
        // sold units stay out of stock
        assert_eq!(catalog.product(1).unwrap().stock, 2);
        Ok(())
    }

    #[test]
    fn reattach_follows_fresh_load() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("warehouse.txt"),
            "Mouse:4500;Keyboard:12000;Desk:30000",
        )?;
        let catalog = CatalogLoader::new(dir.path(), 5);
        catalog.reload()?;

        let mut cart = Cart::new();
        cart.add(&catalog, 2)?; // Keyboard
        cart.update_quantity(&catalog, 0, 3)?;
        cart.add(&catalog, 3)?; // Desk

        // Desk vanishes and Keyboard moves to the front of the file.
        fs::write(dir.path().join("warehouse.txt"), "Keyboard:12000;Mouse:4500")?;
        catalog.reload()?;

        let dropped = cart.reattach(&catalog);
        assert_eq!(dropped, 1);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.items()[0].product_id, 1);
        assert_eq!(cart.items()[0].quantity, 3);
        assert_eq!(catalog.product(1).unwrap().stock, 2);
        assert_eq!(reserved_plus_stock(&cart, &catalog, 1), 5);
        Ok(())
    }

    #[test]
    fn reattach_clamps_to_available_stock() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("warehouse.txt"), "Mouse:4500")?;
        let catalog = CatalogLoader::new(dir.path(), 5);
        catalog.reload()?;

        let mut cart = Cart::new();
        cart.add(&catalog, 1)?;
        cart.update_quantity(&catalog, 0, 4)?;

        // Fresh load starts from a smaller default stock.
        let smaller = CatalogLoader::new(dir.path(), 2);
        smaller.reload()?;
        let dropped = cart.reattach(&smaller);
        assert_eq!(dropped, 0);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(smaller.product(1).unwrap().stock, 0);
        Ok(())
    }
}
