//! Feature extractor framework (§4.2): a named, declarative SQL
//! transformation whose output is owned entirely by the framework —
//! truncate-then-insert into a fixed feature table on every successful
//! run. Extractors never reach the network; they only read the
//! relational store the datasource adapters already populated.

mod az;
mod capabilities;
mod contention;
mod noisy_projects;
mod utilization;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use displaydoc::Display;
use serde_json::Value;
use thiserror::Error;

use crate::config::ExtractorConfig;
use crate::db::Conn;
use crate::model::sync_bookmark::SyncBookmark;
use crate::monitor::Monitor;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
    /// invalid extractor options: {0}
    InvalidOptions(String),
    /// unknown extractor {0:?}
    Unknown(String),
    /// feature write failed: {0}
    Feature(String),
}

/// One declarative transformation (§4.2): `triggers` names the upstream
/// nodes whose success should re-enqueue this extractor in the
/// reconciler's DAG; `run` executes the bound SQL and replaces the
/// output table inside one transaction.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upstream datasource or extractor names this extractor depends on.
    fn triggers(&self) -> &'static [&'static str];

    /// Validates `options` once at startup; unknown fields are a
    /// configuration error per §4.2.
    fn validate_options(&self, options: &Value) -> Result<(), Error>;

    /// Runs the bound SQL and replaces the output feature table.
    /// Returns the row count written.
    async fn run(&self, conn: &mut Conn<'_>, options: &Value) -> Result<usize, Error>;
}

pub struct Registry {
    extractors: HashMap<&'static str, Arc<dyn Extractor>>,
}

impl Registry {
    pub fn with_builtins() -> Self {
        let builtins: Vec<Arc<dyn Extractor>> = vec![
            Arc::new(az::AzExtractor),
            Arc::new(capabilities::CapabilitiesExtractor),
            Arc::new(utilization::UtilizationExtractor),
            Arc::new(noisy_projects::NoisyProjectsExtractor),
            Arc::new(contention::ContentionExtractor::new(
                "contention_long",
                crate::model::feature::contention::Window::Long,
            )),
            Arc::new(contention::ContentionExtractor::new(
                "contention_short",
                crate::model::feature::contention::Window::Short,
            )),
        ];
        Self {
            extractors: builtins.into_iter().map(|e| (e.name(), e)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Extractor>> {
        self.extractors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extractors.keys().copied()
    }
}

/// Runs one configured extractor, honoring the recency skip (§4.2):
/// if a previous successful run is within `recency_seconds`, the run is
/// skipped and this returns `Ok(None)`. A SQL error is surfaced without
/// advancing the bookmark.
pub async fn run_one(
    registry: &Registry,
    config: &ExtractorConfig,
    conn: &mut Conn<'_>,
    monitor: &Monitor,
) -> Result<Option<usize>, Error> {
    let extractor = registry
        .get(&config.name)
        .ok_or_else(|| Error::Unknown(config.name.clone()))?;

    if let Some(recency) = config.recency_seconds {
        if let Some(bookmark) = SyncBookmark::get(&config.name, conn).await? {
            if let Some(last_success) = bookmark.last_success_at {
                let elapsed = (Utc::now() - last_success).num_seconds().max(0) as u64;
                if elapsed < recency {
                    monitor.record_node_skipped(&config.name);
                    return Ok(None);
                }
            }
        }
    }

    let start = Instant::now();
    let result = extractor.run(conn, &config.options).await;
    monitor.record_extractor_run(&config.name, start.elapsed().as_secs_f64());

    match result {
        Ok(count) => {
            SyncBookmark::record_success(&config.name, count as i64, Utc::now(), conn).await?;
            monitor.record_objects(&config.name, count as u64);
            Ok(Some(count))
        }
        Err(e) => {
            SyncBookmark::record_failure(&config.name, &e.to_string(), conn).await?;
            Err(e)
        }
    }
}
