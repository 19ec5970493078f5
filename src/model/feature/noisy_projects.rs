//! `feature_noisy_projects`: a project's average CPU usage across its VMs
//! on a given host (§3), read by `AntiAffinityNoisyProjects` (§4.6).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use std::collections::HashMap;
use thiserror::Error;

use crate::db::Conn;
use crate::model::schema::feature_noisy_projects;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = feature_noisy_projects)]
pub struct NoisyProject {
    pub host_name: String,
    pub project_id: String,
    pub avg_cpu_percent: f64,
    pub computed_at: DateTime<Utc>,
}

impl NoisyProject {
    pub async fn replace_all(rows: Vec<Self>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(feature_noisy_projects::table)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(feature_noisy_projects::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }

    /// `(host, project) -> avg_cpu_percent`, the exact lookup shape the
    /// weigher needs.
    pub async fn as_map(
        conn: &mut Conn<'_>,
    ) -> Result<HashMap<(String, String), f64>, Error> {
        let rows: Vec<Self> = feature_noisy_projects::table.get_results(conn).await?;
        Ok(rows
            .into_iter()
            .map(|r| ((r.host_name, r.project_id), r.avg_cpu_percent))
            .collect())
    }
}
