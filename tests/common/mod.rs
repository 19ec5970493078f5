//! Shared integration-test scaffolding (§1.5): each test gets its own
//! throwaway database via `Context::with_mocked`, following the
//! teacher's `TestServer` pattern (one physical instance, not a
//! process, per test).

use std::sync::Arc;

use cortex_scheduler::config::context::Context;
use cortex_scheduler::db::tests::TestDb;
use cortex_scheduler::reconciler::Reconciler;

pub struct TestHarness {
    pub ctx: Arc<Context>,
    pub reconciler: Arc<Reconciler>,
    _db: TestDb,
}

impl TestHarness {
    /// Requires `ADMIN_DATABASE_URL` (a Postgres connection string with
    /// CREATEDB privilege), `DATABASE_URL`, and `OPERATOR_ID` in the
    /// environment, mirroring how CI wires integration tests for this
    /// crate.
    pub async fn new() -> Self {
        let admin_url = std::env::var("ADMIN_DATABASE_URL")
            .expect("ADMIN_DATABASE_URL must be set to run integration tests");
        let (ctx, reconciler, _rx, db) = Context::with_mocked(&admin_url).await;
        TestHarness {
            ctx,
            reconciler,
            _db: db,
        }
    }
}
