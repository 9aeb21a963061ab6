//! satshop admin API: catalog and ledger maintenance for operators.

mod routes;

use std::{net::SocketAddr, sync::Arc};

use eyre::Result;
use satshop_core::{Settings, telemetry};
use satshop_shop::ShopContext;
use satshop_storage::{self as storage, PgLedger};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(telemetry::DEFAULT_FILTER);
    let settings = Settings::from_env()?;
    let token = settings.require_admin_api_token()?.to_string();

    tracing::info!("Starting satshop admin API");

    let pool = storage::connect(&settings.database_url).await?;
    storage::migrate(&pool).await?;
    tracing::info!("Database ready");

    let shop = ShopContext::new(Arc::new(PgLedger::new(pool)));
    let app = routes::router(Arc::new(AppState::new(&shop, token)));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.admin_port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down gracefully…");
        })
        .await?;

    Ok(())
}
