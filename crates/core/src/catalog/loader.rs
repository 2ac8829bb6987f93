use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::warn;

use crate::models::Product;

/// Thread-safe catalog that discovers products from warehouse files.
///
/// Stock counts live here; the cart reserves units out of them through
/// [`CatalogLoader::take_stock`] and hands them back with
/// [`CatalogLoader::restore_stock`].
#[derive(Clone)]
pub struct CatalogLoader {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    data_dir: PathBuf,
    default_stock: u32,
    products: Vec<Product>,
    loaded: bool,
}

impl CatalogLoader {
    /// Build a new loader rooted at the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>, default_stock: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                data_dir: data_dir.into(),
                default_stock,
                products: Vec::new(),
                loaded: false,
            })),
        }
    }

    /// Data directory the warehouse files are read from.
    pub fn data_dir(&self) -> PathBuf {
        self.inner.read().data_dir.clone()
    }

    /// Re-read every warehouse file, replacing the cached products.
    ///
    /// Ids are reassigned from 1 in file order, so callers holding cart
    /// reservations must re-attach them afterwards.
    pub fn reload(&self) -> Result<usize> {
        let mut inner = self.inner.write();
        inner.products = discover_products(&inner.data_dir, inner.default_stock)?;
        inner.loaded = true;
        Ok(inner.products.len())
    }

    /// Return all known products, populating the cache on first use.
    pub fn products(&self) -> Result<Vec<Product>> {
        let mut inner = self.inner.write();
        if !inner.loaded {
            inner.products = discover_products(&inner.data_dir, inner.default_stock)?;
            inner.loaded = true;
        }
        Ok(inner.products.clone())
    }

    /// Product with the given id, if present.
    pub fn product(&self, id: u32) -> Option<Product> {
        self.inner
            .read()
            .products
            .iter()
            .find(|product| product.id == id)
            .cloned()
    }

    /// Product with the given exact name, if present.
    pub fn find_by_name(&self, name: &str) -> Option<Product> {
        self.inner
            .read()
            .products
            .iter()
            .find(|product| product.name == name)
            .cloned()
    }

    /// Filter products with a case-insensitive ANY-term substring search
    /// over names. An empty query returns everything.
    pub fn search(&self, query: &str) -> Result<Vec<Product>> {
        let products = self.products()?;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|term| term.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(products);
        }

        Ok(products
            .into_iter()
            .filter(|product| {
                let name = product.name.to_lowercase();
                terms.iter().any(|term| name.contains(term))
            })
            .collect())
    }

    /// Reserve `count` units of a product. Returns `false` without touching
    /// anything when the product is unknown or short on stock.
    pub fn take_stock(&self, id: u32, count: u32) -> bool {
        let mut inner = self.inner.write();
        match inner.products.iter_mut().find(|product| product.id == id) {
            Some(product) if product.stock >= count => {
                product.stock -= count;
                true
            }
            _ => false,
        }
    }

    /// Return `count` previously reserved units to a product's stock.
    /// Quietly ignores products that no longer exist.
    pub fn restore_stock(&self, id: u32, count: u32) {
        let mut inner = self.inner.write();
        if let Some(product) = inner.products.iter_mut().find(|product| product.id == id) {
            product.stock += count;
        }
    }
}

/// Public discovery helper used by tests and future tooling.
pub struct ProductDiscovery;

impl ProductDiscovery {
    /// Enumerate products from the warehouse files beneath `data_dir`.
    pub fn discover(data_dir: impl Into<PathBuf>, default_stock: u32) -> Result<Vec<Product>> {
        discover_products(&data_dir.into(), default_stock)
    }
}

fn discover_products(data_dir: &Path, default_stock: u32) -> Result<Vec<Product>> {
    if !data_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(data_dir)
        .with_context(|| format!("failed to read {}", data_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| is_warehouse_file(path))
        .collect();

    // Sorted filename order keeps ids deterministic across loads.
    files.sort();

    let mut products = Vec::new();
    let mut next_id = 1u32;
    for path in files {
        let content =
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let content = content.trim();
        if content.is_empty() {
            continue;
        }

        for entry in content.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match parse_entry(entry) {
                Some((name, price)) => {
                    products.push(Product {
                        id: next_id,
                        name,
                        price,
                        stock: default_stock,
                    });
                    next_id += 1;
                }
                None => warn!("skipping malformed entry {entry:?} in {}", path.display()),
            }
        }
    }

    Ok(products)
}

/// Whether a path looks like `warehouse*.txt`.
pub(crate) fn is_warehouse_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.starts_with("warehouse") && name.ends_with(".txt")
}

fn parse_entry(entry: &str) -> Option<(String, f64)> {
    let mut parts = entry.splitn(2, ':');
    let name = parts.next()?.trim();
    let price = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let price: f64 = price.parse().ok()?;
    Some((name.to_string(), price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discovers_products_across_sorted_files() -> Result<()> {
        let temp = tempdir()?;
        fs::write(
            temp.path().join("warehouse_b.txt"),
            "Mouse:4500;Keyboard:12000",
        )?;
        fs::write(temp.path().join("warehouse_a.txt"), "Laptop:450000")?;
        fs::write(temp.path().join("notes.txt"), "Ignored:1")?;

        let products = ProductDiscovery::discover(temp.path(), 10)?;
        assert_eq!(products.len(), 3);
        // warehouse_a sorts before warehouse_b
        assert_eq!(products[0].id, 1);
        assert_eq!(products[0].name, "Laptop");
        assert_eq!(products[1].name, "Mouse");
        assert_eq!(products[2].name, "Keyboard");
        assert_eq!(products[2].id, 3);
        assert!(products.iter().all(|product| product.stock == 10));
        Ok(())
    }

    #[test]
    fn skips_malformed_entries_and_empty_files() -> Result<()> {
        let temp = tempdir()?;
        fs::write(temp.path().join("warehouse_empty.txt"), "   \n")?;
        fs::write(
            temp.path().join("warehouse1.txt"),
            "Monitor:85000;;broken;NoPrice:;:200;Cable:abc;Desk:30000",
        )?;

        let products = ProductDiscovery::discover(temp.path(), 5)?;
        let names: Vec<&str> = products.iter().map(|product| product.name.as_str()).collect();
        assert_eq!(names, ["Monitor", "Desk"]);
        Ok(())
    }

    #[test]
    fn missing_directory_is_empty() -> Result<()> {
        let temp = tempdir()?;
        let products = ProductDiscovery::discover(temp.path().join("absent"), 10)?;
        assert!(products.is_empty());
        Ok(())
    }

    #[test]
    fn search_matches_any_term_case_insensitively() -> Result<()> {
        let temp = tempdir()?;
        fs::write(
            temp.path().join("warehouse.txt"),
            "Gaming Laptop:450000;Office Chair:60000;Laptop Stand:15000",
        )?;
        let loader = CatalogLoader::new(temp.path(), 10);

        let hits = loader.search("laptop chair")?;
        assert_eq!(hits.len(), 3);

        let hits = loader.search("LAPTOP")?;
        assert_eq!(hits.len(), 2);

        let hits = loader.search("  ")?;
        assert_eq!(hits.len(), 3);

        let hits = loader.search("tablet")?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[test]
    fn stock_reservation_round_trip() -> Result<()> {
        let temp = tempdir()?;
        fs::write(temp.path().join("warehouse.txt"), "Mouse:4500")?;
        let loader = CatalogLoader::new(temp.path(), 3);
        loader.reload()?;

        assert!(loader.take_stock(1, 2));
        assert_eq!(loader.product(1).unwrap().stock, 1);
        assert!(!loader.take_stock(1, 2), "over-reservation must fail");
        assert_eq!(loader.product(1).unwrap().stock, 1);

        loader.restore_stock(1, 2);
        assert_eq!(loader.product(1).unwrap().stock, 3);

        assert!(!loader.take_stock(99, 1));
        loader.restore_stock(99, 1); // unknown product is a no-op
        Ok(())
    }

    #[test]
    fn warehouse_file_names() {
        assert!(is_warehouse_file(Path::new("data/warehouse.txt")));
        assert!(is_warehouse_file(Path::new("warehouse_2.txt")));
        assert!(!is_warehouse_file(Path::new("data/warehouse.csv")));
        assert!(!is_warehouse_file(Path::new("data/products.txt")));
    }
}
