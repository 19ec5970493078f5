//! `feature_az`: host → availability-zone assignment (§3). A missing AZ
//! is a legal state distinct from the empty string — modeled as `None`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use std::collections::HashMap;
use thiserror::Error;

use crate::db::Conn;
use crate::model::schema::feature_az;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = feature_az)]
pub struct HostAz {
    pub host_name: String,
    pub az_name: Option<String>,
    pub computed_at: DateTime<Utc>,
}

impl HostAz {
    pub async fn replace_all(rows: Vec<Self>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(feature_az::table).execute(conn).await?;
                    diesel::insert_into(feature_az::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn as_map(conn: &mut Conn<'_>) -> Result<HashMap<String, Option<String>>, Error> {
        let rows: Vec<Self> = feature_az::table.get_results(conn).await?;
        Ok(rows.into_iter().map(|r| (r.host_name, r.az_name)).collect())
    }
}
