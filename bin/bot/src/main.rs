//! satshop bot: the Telegram storefront.
//!
//! Registers users, answers balance and catalog queries, and redeems promo
//! codes. Deposits are credited by the `watcher` binary.

use std::sync::Arc;

use eyre::Result;
use satshop_bitcoin::{AddressDeriver, NodeClient};
use satshop_core::{Settings, telemetry};
use satshop_shop::ShopContext;
use satshop_storage::{self as storage, PgLedger};
use satshop_telegram::{BotApi, Handler, run_polling};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(telemetry::DEFAULT_FILTER);
    let settings = Settings::from_env()?;

    // Fail on a bad seed before accepting any registration.
    let deriver = AddressDeriver::from_settings(&settings)?;
    let api = BotApi::from_settings(&settings)?;

    tracing::info!(
        network = %deriver.network(),
        path = %settings.derivation_path,
        operators = settings.admin_ids.len(),
        "Starting satshop bot"
    );

    let pool = storage::connect(&settings.database_url).await?;
    storage::migrate(&pool).await?;
    tracing::info!("Database ready");

    let shop = ShopContext::new(Arc::new(PgLedger::new(pool)))
        .configured(&settings)
        .with_source(Arc::new(NodeClient::from_settings(&settings)?))
        .with_deriver(Arc::new(deriver));
    let handler = Handler::new(shop, &settings.admin_ids)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down gracefully…");
        }
        let _ = shutdown_tx.send(true);
    });

    run_polling(&api, &handler, shutdown_rx).await;

    tracing::info!("Bot stopped.");
    Ok(())
}
