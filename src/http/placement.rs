//! Placement-request ingress (§6): the one request/response shape this
//! engine's core actually owns. Everything upstream of this — the
//! OpenStack-facing delegation endpoint itself — is out of scope
//! (spec.md §1) and assumed to forward the same JSON body here.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{post, Router};
use axum::Json;

use crate::config::Context;
use crate::pipeline::decision::DecisionResult;
use crate::pipeline::request::Request;
use crate::pipeline::Runtime;

pub fn router<S>(context: Arc<Context>) -> Router<S>
where
    S: Clone + Send + Sync,
{
    Router::new()
        .route("/placement-requests", post(create))
        .with_state(context)
}

async fn create(
    State(ctx): State<Arc<Context>>,
    Json(request): Json<Request>,
) -> Result<Json<DecisionResult>, crate::Error> {
    let runtime = Runtime::new((*ctx.config).clone())?;
    let result = runtime.decide(request, &ctx.pool, &ctx.monitor).await?;
    Ok(Json(result))
}
