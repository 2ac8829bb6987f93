//! Receipt persistence for completed checkouts.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

use crate::models::{CartItem, Receipt};

/// Manager responsible for writing and listing receipt files.
///
/// Each checkout becomes one pretty-printed JSON file under the receipts
/// root, named after the transaction id and account.
pub struct ReceiptStore {
    root: PathBuf,
}

impl ReceiptStore {
    /// Create a new store rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist a new receipt and return it.
    pub fn record(
        &self,
        username: &str,
        items: Vec<CartItem>,
        total: f64,
        balance_after: f64,
    ) -> Result<Receipt> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let created_at = Utc::now();
        let receipt = Receipt {
            id: format!("TXN{}", created_at.timestamp()),
            username: username.to_string(),
            items,
            total,
            balance_after,
            created_at,
        };

        let file_name = format!(
            "{}_{}.json",
            sanitize_component(&receipt.id),
            sanitize_component(username)
        );
        let path = self.root.join(file_name);
        let serialized = serde_json::to_vec_pretty(&receipt)?;
        fs::write(&path, serialized)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(receipt)
    }

    /// All readable receipts, most recent first.
    pub fn entries(&self) -> Result<Vec<Receipt>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut receipts = Vec::new();
        for entry in fs::read_dir(&self.root).context("failed to read receipts directory")? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match read_receipt(&entry.path()) {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => warn!("failed to read receipt {:?}: {err}", entry.path()),
            }
        }

        receipts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(receipts)
    }

    /// Receipts for one account, most recent first.
    pub fn entries_for(&self, username: &str) -> Result<Vec<Receipt>> {
        let mut receipts = self.entries()?;
        receipts.retain(|receipt| receipt.username == username);
        Ok(receipts)
    }
}

fn read_receipt(path: &Path) -> Result<Receipt> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
            result.push(ch);
        }
    }
    if result.is_empty() {
        "receipt".to_string()
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn line(id: u32, name: &str, quantity: u32, price: f64) -> CartItem {
        CartItem {
            product_id: id,
            quantity,
            name: name.to_string(),
            price,
        }
    }

    #[test]
    fn record_and_list_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = ReceiptStore::new(dir.path().join("receipts"));

        let receipt = store.record(
            "ada",
            vec![line(1, "Mouse", 2, 4500.0), line(3, "Desk", 1, 30000.0)],
            39000.0,
            11000.0,
        )?;
        assert!(receipt.id.starts_with("TXN"));

        let entries = store.entries()?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "ada");
        assert_eq!(entries[0].items.len(), 2);
        assert_eq!(entries[0].total, 39000.0);
        assert_eq!(entries[0].balance_after, 11000.0);
        Ok(())
    }

    #[test]
    fn entries_are_filtered_by_account() -> Result<()> {
        let dir = tempdir()?;
        let store = ReceiptStore::new(dir.path());

        store.record("ada", vec![line(1, "Mouse", 1, 4500.0)], 4500.0, 500.0)?;
        store.record("bob", vec![line(2, "Keyboard", 1, 12000.0)], 12000.0, 0.0)?;

        assert_eq!(store.entries()?.len(), 2);
        let ada = store.entries_for("ada")?;
        assert_eq!(ada.len(), 1);
        assert_eq!(ada[0].items[0].name, "Mouse");
        assert!(store.entries_for("carol")?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_root_lists_nothing() -> Result<()> {
        let dir = tempdir()?;
        let store = ReceiptStore::new(dir.path().join("absent"));
        assert!(store.entries()?.is_empty());
        Ok(())
    }

    #[test]
    fn sanitize_creates_safe_filenames() {
        assert_eq!(sanitize_component("TXN1700000000"), "TXN1700000000");
        assert_eq!(sanitize_component("we?ird/../name"), "weirdname");
        assert_eq!(sanitize_component("!!"), "receipt");
    }
}
