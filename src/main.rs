use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use log::info;
use rust_decimal::Decimal;

use matchbook::api::{create_app, AppState};
use matchbook::asset_catalog::AssetCatalog;
use matchbook::bus::{EventBus, MemoryBus};
use matchbook::configure::load_config;
use matchbook::engine::MatchingEngine;
use matchbook::logger;
use matchbook::settlement_processor::SettlementProcessor;
use matchbook::store::{MemoryStore, Store};

/// Fixed test addresses funded on first boot.
const SEED_ADDRESSES: [&str; 4] = [
    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
    "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
    "0xcccccccccccccccccccccccccccccccccccccccc",
    "0xdddddddddddddddddddddddddddddddddddddddd",
];

fn seed_entries(catalog: &AssetCatalog) -> Result<Vec<(String, String, u64)>> {
    let grants = [
        ("USDC", Decimal::from(10_000)),
        ("USDT", Decimal::from(10_000)),
        ("ETH", Decimal::from(5)),
        ("BTC", Decimal::new(5, 1)),
        ("DAI", Decimal::from(1_000)),
    ];

    let mut entries = Vec::new();
    for address in SEED_ADDRESSES {
        for (asset, amount) in grants {
            let raw = catalog
                .to_raw(asset, amount)
                .map_err(|e| anyhow::anyhow!("invalid seed amount: {}", e))?;
            entries.push((address.to_string(), asset.to_string(), raw));
        }
    }
    Ok(entries)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = load_config()?;
    logger::setup_logger(&config).map_err(|e| anyhow::anyhow!("logger setup failed: {}", e))?;

    info!(
        "starting exchange backend (database={}, redis={})",
        config.database_url, config.redis_url
    );

    let catalog = Arc::new(AssetCatalog::new());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(catalog.clone()));
    if store.seed_balances(&seed_entries(&catalog)?).await? {
        info!("seeded balances for {} test addresses", SEED_ADDRESSES.len());
    }

    let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
    let engine = Arc::new(MatchingEngine::new(store.clone(), catalog.clone()));

    let processor = SettlementProcessor::new(
        store.clone(),
        bus.clone(),
        (config.settlement_delay_min_ms, config.settlement_delay_max_ms),
    );
    processor.start().await;

    let state = Arc::new(AppState { store, bus, engine, catalog });
    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
