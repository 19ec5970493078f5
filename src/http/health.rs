//! Liveness probe: a database round trip, not just a process-alive check.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, Router};

use crate::config::Context;

pub fn router<S>(context: Arc<Context>) -> Router<S>
where
    S: Clone + Send + Sync,
{
    Router::new().route("/healthz", get(healthz)).with_state(context)
}

async fn healthz(State(ctx): State<Arc<Context>>) -> StatusCode {
    match ctx.pool.conn().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "healthz: could not check out a connection");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
