//! `metric_samples`: time-series metric samples from the monitoring
//! datasource (§3). Bounded retention — rows older than the configured
//! time-range are deleted on each sync, never accumulated forever.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;

use super::schema::metric_samples;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = metric_samples)]
pub struct MetricSample {
    pub metric_name: String,
    pub host_name: String,
    pub sample_time: DateTime<Utc>,
    pub value: f64,
    pub labels: serde_json::Value,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = metric_samples)]
pub struct NewMetricSample {
    pub metric_name: String,
    pub host_name: String,
    pub sample_time: DateTime<Utc>,
    pub value: f64,
    pub labels: serde_json::Value,
}

impl MetricSample {
    /// Upserts `rows`, then prunes anything older than `retain_since`.
    /// Both run in one transaction so a reader never sees samples pruned
    /// without the corresponding fresh ones having landed yet.
    pub async fn upsert_and_prune(
        rows: Vec<NewMetricSample>,
        retain_since: DateTime<Utc>,
        conn: &mut Conn<'_>,
    ) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    let written = diesel::insert_into(metric_samples::table)
                        .values(&rows)
                        .on_conflict((
                            metric_samples::metric_name,
                            metric_samples::host_name,
                            metric_samples::sample_time,
                        ))
                        .do_update()
                        .set(metric_samples::value.eq(diesel::upsert::excluded(metric_samples::value)))
                        .execute(conn)
                        .await?;
                    diesel::delete(
                        metric_samples::table.filter(metric_samples::sample_time.lt(retain_since)),
                    )
                    .execute(conn)
                    .await?;
                    Ok(written)
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn for_host(
        metric_name: &str,
        host_name: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Vec<Self>, Error> {
        Ok(metric_samples::table
            .filter(metric_samples::metric_name.eq(metric_name))
            .filter(metric_samples::host_name.eq(host_name))
            .order(metric_samples::sample_time.asc())
            .get_results(conn)
            .await?)
    }
}
