mod app;
mod block_font;

use anyhow::Result;
use std::fs::{self, OpenOptions};

use tokio::sync::mpsc;
use tracing_subscriber::{prelude::*, EnvFilter};

use shoptui_core::{
    accounts::AccountStore,
    catalog::{self, CatalogLoader},
    config::{self, AppConfig},
    receipts::ReceiptStore,
    session::Session,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    fs::create_dir_all(&config.data_dir)?;

    let accounts = AccountStore::open(config.accounts_path())?;
    let catalog = CatalogLoader::new(&config.data_dir, config.default_stock);
    catalog.reload()?;
    let receipts = ReceiptStore::new(config.receipts_root());
    let session = Session::new(accounts, catalog, receipts);

    let mut app = app::ShopApp::new(config.clone(), session);
    let _watcher = if config.watch_catalog {
        let (watch_tx, watch_rx) = mpsc::channel(8);
        app.attach_watch(watch_rx);
        Some(catalog::watch_data_dir(&config.data_dir, watch_tx)?)
    } else {
        None
    };

    app.run().await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("shoptui.log");

    let env_filter = EnvFilter::from_default_env();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
