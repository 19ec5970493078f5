//! `feature_contention`: per-host CPU-contention statistics over a named
//! window (`long` or `short`), read by the two `AvoidContendedHosts`
//! variants (§4.6), which differ only in which window they consult.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use std::collections::HashMap;
use thiserror::Error;

use crate::db::Conn;
use crate::model::schema::feature_contention;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    Long,
    Short,
}

impl Window {
    pub fn as_str(self) -> &'static str {
        match self {
            Window::Long => "long",
            Window::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = feature_contention)]
pub struct HostContention {
    pub host_name: String,
    pub window: String,
    pub avg_contention: f64,
    pub max_contention: f64,
    pub computed_at: DateTime<Utc>,
}

impl HostContention {
    pub async fn replace_all(
        window: Window,
        rows: Vec<Self>,
        conn: &mut Conn<'_>,
    ) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(
                        feature_contention::table
                            .filter(feature_contention::window.eq(window.as_str())),
                    )
                    .execute(conn)
                    .await?;
                    diesel::insert_into(feature_contention::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn as_map(
        window: Window,
        conn: &mut Conn<'_>,
    ) -> Result<HashMap<String, Self>, Error> {
        let rows: Vec<Self> = feature_contention::table
            .filter(feature_contention::window.eq(window.as_str()))
            .get_results(conn)
            .await?;
        Ok(rows.into_iter().map(|r| (r.host_name.clone(), r)).collect())
    }
}
