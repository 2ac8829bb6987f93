//! Application configuration layered from a TOML file and the environment.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Directory name under the user config root.
pub const CONFIG_DIR: &str = "shoptui";

/// Environment variable prefix for overrides, e.g. `SHOPTUI_DATA_DIR`.
pub const ENV_PREFIX: &str = "SHOPTUI";

const DEFAULT_CONFIG: &str = r#"# shoptui configuration.
# Values here are overridden by SHOPTUI_* environment variables.

# Directory holding accounts.txt, warehouse*.txt and receipts/.
data_dir = "data"

# Currency label shown next to every amount.
currency = "NGN"

# Stock assigned to each product when the catalog is loaded.
default_stock = 10

# Reload the catalog when warehouse files change on disk.
watch_catalog = true
"#;

/// Runtime settings for the storefront.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding the flat-file store data.
    pub data_dir: PathBuf,
    /// Currency label used when formatting amounts.
    pub currency: String,
    /// Stock assigned to every product at catalog load.
    pub default_stock: u32,
    /// Whether to watch the data directory for catalog changes.
    pub watch_catalog: bool,
}

impl AppConfig {
    /// Load configuration: defaults, then the config file, then `SHOPTUI_*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .set_default("data_dir", "data")?
            .set_default("currency", "NGN")?
            .set_default("default_stock", 10)?
            .set_default("watch_catalog", true)?
            .add_source(File::from(config_path()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config = builder.build().context("failed to assemble configuration")?;
        config
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// Location of the accounts file inside the data directory.
    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join("accounts.txt")
    }

    /// Root directory for persisted receipts.
    pub fn receipts_root(&self) -> PathBuf {
        self.data_dir.join("receipts")
    }
}

/// Path of the user-level configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("config.toml")
}

/// Write a commented default configuration on first run.
pub fn ensure_default_config() -> Result<()> {
    let path = config_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let config: AppConfig = Config::builder()
            .set_default("data_dir", "data")
            .unwrap()
            .set_default("currency", "NGN")
            .unwrap()
            .set_default("default_stock", 10)
            .unwrap()
            .set_default("watch_catalog", true)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.currency, "NGN");
        assert_eq!(config.default_stock, 10);
        assert!(config.watch_catalog);
    }

    #[test]
    fn default_config_parses_as_toml() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.default_stock, 10);
        assert_eq!(config.accounts_path(), PathBuf::from("data/accounts.txt"));
        assert_eq!(config.receipts_root(), PathBuf::from("data/receipts"));
    }
}
