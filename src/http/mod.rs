//! Minimal HTTP surface (§2 supplemented features): the placement-request
//! ingress plus a liveness probe. Building the full OpenStack-facing REST
//! surface remains out of scope (spec.md §1) — this is only the thin
//! entry/exit point §6 itself describes, in the teacher's `http::server`
//! shape (one router-returning function per concern, merged at the top).

pub mod health;
pub mod placement;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Context;

pub fn router(context: Arc<Context>) -> Router {
    Router::new()
        .merge(health::router(context.clone()))
        .merge(placement::router(context))
        .layer(TraceLayer::new_for_http())
}

/// Runs the HTTP listener until `shutdown` fires, mirroring the
/// reconciler's own select-on-broadcast discipline (§2 "graceful
/// shutdown").
pub async fn serve(
    context: Arc<Context>,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = router(context);
    info!(%addr, "http listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
