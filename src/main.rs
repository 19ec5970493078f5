//! Process bootstrap: install the tracing/OTel providers, assemble the
//! `Context`, run embedded migrations, run each configured datasource's
//! one-time `Init`, then drive the reconciler's event loop and the HTTP
//! listener side by side until a shutdown signal arrives (§2 "graceful
//! shutdown").

use std::net::SocketAddr;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::MigrationHarness;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use cortex_scheduler::config::context::Context;
use cortex_scheduler::config::log::{default_filter, Log};
use cortex_scheduler::datasource::Registry as DatasourceRegistry;
use cortex_scheduler::{http, MIGRATIONS};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    Log::new("cortex-scheduler", default_filter(), otlp_endpoint.as_deref()).init()?;

    let (ctx, reconciler, rx) = Context::new().await?;

    run_migrations(ctx.config.global.database.url.clone()).await?;

    // One-shot, not the reconciler's own registry: Init runs once at
    // startup and never again, so it doesn't need to share the
    // reconciler's long-lived adapter instances.
    let datasources = DatasourceRegistry::build(&ctx.config);
    for name in datasources.names().map(str::to_string).collect::<Vec<_>>() {
        if let Some(adapter) = datasources.get(&name) {
            if let Err(e) = adapter.init(&ctx.pool).await {
                error!(datasource = %name, error = %e, "datasource init failed, adapter disabled");
            }
        }
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let addr: SocketAddr = ctx.config.global.http_addr.parse()?;

    let reconciler_task = tokio::spawn(reconciler.run(rx, shutdown_tx.subscribe()));
    let http_task = tokio::spawn(http::serve(ctx.clone(), addr, shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    if let Err(e) = reconciler_task.await {
        warn!(error = %e, "reconciler task panicked");
    }
    match http_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "http listener exited with error"),
        Err(e) => warn!(error = %e, "http task panicked"),
    }

    Ok(())
}

async fn run_migrations(database_url: String) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run pending migrations: {e}"))?;
        Ok::<(), anyhow::Error>(())
    })
    .await??;
    Ok(())
}
