//! Dependency reconciler (§4.3): the only component that drives time.
//! Walks a DAG of `{datasources} ∪ {extractors}` (pipelines are nodes in
//! name only — they run on request, never on a tick), re-enqueuing a
//! node's dependents on its success and sweeping every node's recency
//! threshold on a fixed interval.

pub mod dag;
pub mod event;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::datasource;
use crate::db::Pool;
use crate::extractor;
use crate::model::sync_bookmark::SyncBookmark;
use crate::monitor::Monitor;

use dag::{Dag, NodeId};
use event::Event;

const TICK_INTERVAL: Duration = Duration::from_secs(30);
const MAX_RETRY_JITTER_SECS: u64 = 10;
const DEFAULT_RECENCY_SECS: u64 = 300;

/// Per-node bookkeeping for the single-in-flight / latest-wins
/// discipline (§4.3): a node currently running is tracked in
/// `in_flight`; an enqueue that arrives while it's running sets
/// `pending` instead of queuing a second run, and is drained once the
/// current run completes.
#[derive(Default)]
struct Scheduler {
    in_flight: HashSet<String>,
    pending: HashSet<String>,
}

pub struct Reconciler {
    dag: Dag,
    datasources: Arc<datasource::Registry>,
    extractors: Arc<extractor::Registry>,
    config: Config,
    pool: Pool,
    monitor: Monitor,
    tx: mpsc::UnboundedSender<Event>,
}

impl Reconciler {
    /// Builds a reconciler and validates every configured extractor's
    /// `options` against its own `Extractor::validate_options` (§7
    /// "configuration fault ... surfaced at initialization; the
    /// component refuses to start").
    pub fn new(
        config: Config,
        pool: Pool,
        monitor: Monitor,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Event>), extractor::Error> {
        let datasources = Arc::new(datasource::Registry::build(&config));
        let extractors = Arc::new(extractor::Registry::with_builtins());

        for extractor_config in &config.extractors {
            let extractor = extractors
                .get(&extractor_config.name)
                .ok_or_else(|| extractor::Error::Unknown(extractor_config.name.clone()))?;
            extractor.validate_options(&extractor_config.options)?;
        }

        let dag = build_dag(&config, &extractors);
        let (tx, rx) = mpsc::unbounded_channel();

        let reconciler = Arc::new(Self {
            dag,
            datasources,
            extractors,
            config,
            pool,
            monitor,
            tx,
        });
        Ok((reconciler, rx))
    }

    pub fn handle(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Runs the event loop until `shutdown` fires. Owns the receiver end
    /// of the work channel and a periodic tick timer; both are polled
    /// inside one `tokio::select!`.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Event>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let scheduler = Arc::new(Mutex::new(Scheduler::default()));
        let mut ticker = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("reconciler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.clone().sweep_recency(scheduler.clone()).await;
                }
                event = rx.recv() => {
                    match event {
                        Some(Event::Enqueue(node)) => {
                            self.clone().dispatch(node, scheduler.clone()).await;
                        }
                        Some(Event::Tick) => {
                            self.clone().sweep_recency(scheduler.clone()).await;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn dispatch(self: Arc<Self>, node: NodeId, scheduler: Arc<Mutex<Scheduler>>) {
        let key = node.key();
        {
            let mut guard = scheduler.lock().await;
            if guard.in_flight.contains(&key) {
                guard.pending.insert(key.clone());
                return;
            }
            guard.in_flight.insert(key.clone());
        }

        tokio::spawn(async move {
            // Loop rather than recurse: a pending re-enqueue observed
            // right after this run finishes is collapsed into one more
            // run of the same node, not a fresh task (§4.3 "latest-wins").
            loop {
                self.run_node(&node).await;

                let requeue = {
                    let mut guard = scheduler.lock().await;
                    if guard.pending.remove(&key) {
                        true
                    } else {
                        guard.in_flight.remove(&key);
                        false
                    }
                };
                if !requeue {
                    break;
                }
            }
        });
    }

    async fn run_node(&self, node: &NodeId) {
        let result = match node {
            NodeId::Datasource(name) => self.run_datasource(name).await,
            NodeId::Extractor(name) => self.run_extractor(name).await,
            NodeId::Pipeline(_) => Ok(()),
        };

        match result {
            Ok(()) => {
                for dependent in self.dag.dependents_of(node.name()) {
                    let _ = self.tx.send(Event::Enqueue(dependent.clone()));
                }
            }
            Err(e) => {
                warn!(node = node.name(), error = %e, "reconciler node failed, bookmark preserved");
                tokio::time::sleep(jittered_retry_delay(Duration::from_secs(0))).await;
            }
        }
    }

    async fn run_datasource(&self, name: &str) -> anyhow::Result<()> {
        let Some(adapter) = self.datasources.get(name) else {
            return Ok(());
        };
        adapter.sync(&self.pool).await?;
        Ok(())
    }

    async fn run_extractor(&self, name: &str) -> anyhow::Result<()> {
        let Some(config) = self.config.extractors.iter().find(|e| e.name == name) else {
            return Ok(());
        };
        let mut conn = self.pool.conn().await?;
        extractor::run_one(&self.extractors, config, &mut conn, &self.monitor).await?;
        Ok(())
    }

    /// Sweeps every configured node and enqueues those whose bookmark is
    /// stale beyond their configured (or default) recency. A small
    /// random jitter avoids a thundering herd of simultaneous reruns
    /// after a shared outage (§5 "jitter").
    async fn sweep_recency(self: Arc<Self>, scheduler: Arc<Mutex<Scheduler>>) {
        let mut conn = match self.pool.conn().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "reconciler could not check out a connection for its recency sweep");
                return;
            }
        };

        for name in self.datasources.names().map(str::to_string).collect::<Vec<_>>() {
            if self.is_stale(&name, DEFAULT_RECENCY_SECS, &mut conn).await {
                self.clone()
                    .dispatch(NodeId::Datasource(name), scheduler.clone())
                    .await;
            }
        }

        for extractor_config in &self.config.extractors {
            let recency = extractor_config.recency_seconds.unwrap_or(DEFAULT_RECENCY_SECS);
            if self.is_stale(&extractor_config.name, recency, &mut conn).await {
                self.clone()
                    .dispatch(NodeId::Extractor(extractor_config.name.clone()), scheduler.clone())
                    .await;
            }
        }
    }

    async fn is_stale(&self, name: &str, recency_secs: u64, conn: &mut crate::db::Conn<'_>) -> bool {
        match SyncBookmark::get(name, conn).await {
            Ok(Some(bookmark)) => match bookmark.last_success_at {
                Some(last) => {
                    let elapsed = (chrono::Utc::now() - last).num_seconds().max(0) as u64;
                    elapsed >= recency_secs
                }
                None => true,
            },
            Ok(None) => true,
            Err(e) => {
                warn!(node = name, error = %e, "could not read bookmark during recency sweep");
                false
            }
        }
    }
}

fn build_dag(config: &Config, extractors: &extractor::Registry) -> Dag {
    let mut dag = Dag::new();
    for extractor_config in &config.extractors {
        let Some(extractor) = extractors.get(&extractor_config.name) else {
            continue;
        };
        for trigger in extractor.triggers() {
            dag.add_edge(trigger, NodeId::Extractor(extractor_config.name.clone()));
        }
    }
    dag
}

/// Jittered backoff for retry scheduling after an upstream failure (§7
/// "upstream unavailable"): `base` plus up to `MAX_RETRY_JITTER_SECS` of
/// randomness, so a shared upstream blip doesn't cause every node to
/// retry in lockstep.
pub fn jittered_retry_delay(base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=MAX_RETRY_JITTER_SECS);
    base + Duration::from_secs(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Availability, DatasourceConfig, DatasourceType, ExtractorConfig};

    fn sample_config() -> Config {
        Config {
            global: crate::config::GlobalConfig {
                operator_id: "op".into(),
                database: crate::db::DbOptions {
                    url: String::new(),
                    max_conns: 1,
                    min_conns: 1,
                },
                monitor_labels: vec![],
                identity_auth_url: String::new(),
                identity_username: String::new(),
                identity_password: zeroize::Zeroizing::new(String::new()),
                http_addr: "0.0.0.0:8080".into(),
            },
            datasources: vec![DatasourceConfig {
                name: "compute".into(),
                availability: Availability::Internal,
                types: vec![DatasourceType::Hypervisors],
                delta_window_minutes: None,
            }],
            extractors: vec![
                ExtractorConfig {
                    name: "feature_az".into(),
                    recency_seconds: Some(300),
                    options: serde_json::Value::Null,
                },
                ExtractorConfig {
                    name: "feature_utilization".into(),
                    recency_seconds: Some(300),
                    options: serde_json::Value::Null,
                },
            ],
            pipelines: vec![],
        }
    }

    /// Scenario 5 (§8): a datasource's trigger name fans out to every
    /// extractor that declared it, and only those extractors — a node
    /// this trigger doesn't name stays untouched.
    #[test]
    fn datasource_completion_fans_out_to_declared_extractors() {
        let config = sample_config();
        let extractors = extractor::Registry::with_builtins();
        let dag = build_dag(&config, &extractors);

        let deps = dag.dependents_of("compute");
        let names: Vec<&str> = deps.iter().map(NodeId::name).collect();
        assert!(names.contains(&"feature_az"));
        assert!(names.contains(&"feature_utilization"));
        assert!(dag.dependents_of("placement").is_empty());
    }

    #[test]
    fn jittered_retry_delay_never_exceeds_base_plus_max() {
        let base = Duration::from_secs(5);
        for _ in 0..20 {
            let delay = jittered_retry_delay(base);
            assert!(delay >= base);
            assert!(delay <= base + Duration::from_secs(MAX_RETRY_JITTER_SECS));
        }
    }
}
