//! Service `Context`: metadata threaded down to HTTP handlers, steps, and
//! background tasks. Every field is an `Arc` (or cheaply cloneable) so
//! each holder can retain its own reference, mirroring the teacher's
//! `config::context::Context`.

use std::sync::Arc;

use displaydoc::Display;
use thiserror::Error;
use tokio::sync::mpsc;

use super::Config;
use crate::db::Pool;
use crate::monitor::Monitor;
use crate::reconciler::event::Event;
use crate::reconciler::Reconciler;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// failed to build Config: {0}
    Config(#[from] super::Error),
    /// failed to build connection pool: {0}
    Pool(#[from] crate::db::Error),
    /// a configured extractor rejected its options: {0}
    ExtractorConfig(#[from] crate::extractor::Error),
}

#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub pool: Pool,
    pub monitor: Arc<Monitor>,
    /// Sender half of the reconciler's work channel (§4.3). Handlers and
    /// steps use this to nudge a node to re-run; the receiver and the
    /// `Reconciler` itself are owned by the background task `main`
    /// spawns, not by the `Context`.
    pub reconciler: mpsc::UnboundedSender<Event>,
}

impl Context {
    pub async fn new() -> Result<(Arc<Self>, Arc<Reconciler>, mpsc::UnboundedReceiver<Event>), Error> {
        let config = Config::from_default_toml().map_err(Error::Config)?;
        Self::from_config(config).await
    }

    pub async fn from_config(
        config: Config,
    ) -> Result<(Arc<Self>, Arc<Reconciler>, mpsc::UnboundedReceiver<Event>), Error> {
        let pool = Pool::new(&config.global.database).await?;
        let log = crate::config::log::Log::new(
            "cortex-scheduler",
            crate::config::log::default_filter(),
            None,
        );
        let monitor = Monitor::new(&log.meter("cortex-scheduler"));
        let (reconciler, rx) = Reconciler::new(config.clone(), pool.clone(), monitor.clone())?;
        let handle = reconciler.handle();
        let ctx = Arc::new(Context {
            config: Arc::new(config),
            pool,
            monitor: Arc::new(monitor),
            reconciler: handle,
        });
        Ok((ctx, reconciler, rx))
    }

    #[cfg(any(test, feature = "integration-test"))]
    pub async fn with_mocked(
        admin_db_url: &str,
    ) -> (Arc<Self>, Arc<Reconciler>, mpsc::UnboundedReceiver<Event>, crate::db::tests::TestDb) {
        let mut config = Config::new().unwrap_or_else(|_| {
            panic!("tests must set DATABASE_URL, OPERATOR_ID in the environment")
        });
        let db = crate::db::tests::TestDb::setup(admin_db_url).await;
        config.global.database = crate::db::DbOptions {
            url: String::new(),
            max_conns: 5,
            min_conns: 1,
        };
        let log = crate::config::log::Log::new("cortex-scheduler-test", "warn", None);
        let monitor = Monitor::new(&log.meter("cortex-scheduler-test"));
        let pool = db.pool.clone();
        let (reconciler, rx) = Reconciler::new(config.clone(), pool.clone(), monitor.clone())
            .expect("test config must carry valid extractor options");
        let handle = reconciler.handle();
        let ctx = Arc::new(Context {
            config: Arc::new(config),
            pool,
            monitor: Arc::new(monitor),
            reconciler: handle,
        });
        (ctx, reconciler, rx, db)
    }
}
