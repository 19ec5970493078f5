//! `feature_utilization`: per-host current percentages, guaranteed
//! internally consistent (percentage = used / total × 100), plus the
//! totals they were derived from (§3) so `ResourceBalancing` (§4.6) can
//! compute a post-placement projection without a second query.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use std::collections::HashMap;
use thiserror::Error;

use crate::db::Conn;
use crate::model::schema::feature_utilization;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = feature_utilization)]
pub struct HostUtilization {
    pub host_name: String,
    pub vcpus_total: i64,
    pub vcpus_used: i64,
    pub vcpu_percent: f64,
    pub mem_total_mb: i64,
    pub mem_used_mb: i64,
    pub mem_percent: f64,
    pub disk_total_gb: i64,
    pub disk_used_gb: i64,
    pub disk_percent: f64,
    pub computed_at: DateTime<Utc>,
}

impl HostUtilization {
    pub async fn replace_all(rows: Vec<Self>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(feature_utilization::table)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(feature_utilization::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn as_map(conn: &mut Conn<'_>) -> Result<HashMap<String, Self>, Error> {
        let rows: Vec<Self> = feature_utilization::table.get_results(conn).await?;
        Ok(rows.into_iter().map(|r| (r.host_name.clone(), r)).collect())
    }
}
