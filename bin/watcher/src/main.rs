//! satshop watcher: credits confirmed deposits.
//!
//! Flow:
//! 1. Connect to PostgreSQL and the Bitcoin Core wallet
//! 2. Make sure every issued address is watched by the wallet
//! 3. Poll `listsinceblock`, record sightings, settle deposits at the threshold
//! 4. Notify users over Telegram when their balance is credited
//!
//! Ctrl-C stops the loop between cycles.

use std::sync::Arc;

use eyre::Result;
use satshop_bitcoin::NodeClient;
use satshop_core::{Settings, telemetry};
use satshop_shop::{LogNotifier, Notifier, ShopContext};
use satshop_storage::{self as storage, PgLedger};
use satshop_telegram::{BotApi, TelegramNotifier};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(telemetry::DEFAULT_FILTER);
    let settings = Settings::from_env()?;

    tracing::info!(
        rpc = %settings.rpc_url,
        network = %settings.network,
        confirmations = settings.confirmations,
        "Starting satshop watcher"
    );

    let pool = storage::connect(&settings.database_url).await?;
    storage::migrate(&pool).await?;
    tracing::info!("Database ready");

    let node = Arc::new(NodeClient::from_settings(&settings)?);

    // Credits are still applied without a bot token; users just aren't told.
    let notifier: Arc<dyn Notifier> = match BotApi::from_settings(&settings) {
        Ok(api) => Arc::new(TelegramNotifier::new(api)),
        Err(e) => {
            tracing::warn!(error = %e, "Telegram notifications disabled");
            Arc::new(LogNotifier)
        }
    };

    let shop = ShopContext::new(Arc::new(PgLedger::new(pool)))
        .configured(&settings)
        .with_source(node)
        .with_notifier(notifier);
    let observer = shop.observer()?;

    match observer.sync_watch_list().await {
        Ok(count) => tracing::info!(count, "Issued addresses watched"),
        Err(e) => tracing::warn!(error = %e, "Could not sync watch list, retrying each cycle"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down gracefully…");
        }
        let _ = shutdown_tx.send(true);
    });

    observer.run(shutdown_rx).await;

    tracing::info!("Watcher stopped.");
    Ok(())
}
