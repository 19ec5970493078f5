//! Time-series metrics datasource adapter (§3, §4.1, §6): range-queries a
//! Prometheus-compatible HTTP API (`query`/`start`/`end`/`step`) for a
//! fixed set of named metrics, and retains only a bounded trailing window
//! on each sync.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::config::DatasourceConfig;
use crate::db::Pool;
use crate::model::{metric_sample::NewMetricSample, SyncBookmark};

use super::identity::IdentityClient;
use super::{DeletionDiscipline, Datasource, Error};

const NAME: &str = "metrics_ts";
const RETENTION_HOURS: i64 = 6;
const STEP_SECONDS: i64 = 60;
const TRACKED_METRICS: &[&str] = &["host_cpu_contention_short", "host_cpu_contention_long"];

#[derive(Debug, Deserialize)]
struct RangeResponse {
    data: RangeData,
}

#[derive(Debug, Deserialize)]
struct RangeData {
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    metric: std::collections::HashMap<String, String>,
    values: Vec<(f64, String)>,
}

pub struct MetricsDatasource {
    http: reqwest::Client,
    identity: Arc<IdentityClient>,
    #[allow(dead_code)]
    config: DatasourceConfig,
}

impl MetricsDatasource {
    pub fn new(
        http: reqwest::Client,
        identity: Arc<IdentityClient>,
        config: DatasourceConfig,
    ) -> Self {
        Self { http, identity, config }
    }

    async fn query_range(
        &self,
        endpoint: &str,
        token: &str,
        metric: &str,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Result<Vec<NewMetricSample>, Error> {
        let response: RangeResponse = self
            .http
            .get(format!("{endpoint}/api/v1/query_range"))
            .bearer_auth(token)
            .query(&[
                ("query", metric.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", STEP_SECONDS.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;

        let mut rows = Vec::new();
        for series in response.data.result {
            let Some(host_name) = series.metric.get("host").or_else(|| series.metric.get("instance")) else {
                continue;
            };
            for (timestamp, value) in series.values {
                let Ok(value) = value.parse::<f64>() else { continue };
                let sample_time = chrono::DateTime::from_timestamp(timestamp as i64, 0)
                    .unwrap_or(end);
                rows.push(NewMetricSample {
                    metric_name: metric.to_string(),
                    host_name: host_name.clone(),
                    sample_time,
                    value,
                    labels: serde_json::to_value(&series.metric).unwrap_or_default(),
                });
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl Datasource for MetricsDatasource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn deletion_discipline(&self) -> DeletionDiscipline {
        DeletionDiscipline::Delta
    }

    async fn init(&self, pool: &Pool) -> Result<(), Error> {
        let mut conn = pool.conn().await?;
        SyncBookmark::record_success(NAME, 0, Utc::now(), &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        Ok(())
    }

    async fn sync(&self, pool: &Pool) -> Result<super::SyncOutcome, Error> {
        let endpoint = self
            .identity
            .endpoint("monitoring", "public")
            .await
            .map_err(Error::Identity)?;
        let token = self.identity.bearer_token().await.map_err(Error::Identity)?;

        let end = Utc::now();
        let start = end - Duration::hours(RETENTION_HOURS);
        let retain_since = start;

        let mut rows_written = 0u64;
        for metric in TRACKED_METRICS {
            let rows = self.query_range(&endpoint, &token, metric, start, end).await?;
            let count = rows.len() as u64;
            let mut conn = pool.conn().await?;
            crate::model::metric_sample::MetricSample::upsert_and_prune(rows, retain_since, &mut conn)
                .await
                .map_err(|e| Error::Model(e.into()))?;
            rows_written += count;
        }

        let mut conn = pool.conn().await?;
        SyncBookmark::record_success(NAME, rows_written as i64, end, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;

        Ok(super::SyncOutcome {
            rows_written,
            next_due: Utc::now() + Duration::seconds(60),
        })
    }
}
