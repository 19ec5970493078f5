//! `feature_capabilities`: per-host traits, CPU info, hypervisor type,
//! and disabled/agent-down flags (§3) — joined data that
//! `FilterHasRequestedTraits`, `FilterComputeCapabilities`, and
//! `FilterDisabled` read (§4.6).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use std::collections::HashMap;
use thiserror::Error;

use crate::db::Conn;
use crate::model::schema::feature_capabilities;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = feature_capabilities)]
pub struct HostCapabilities {
    pub host_name: String,
    pub traits: serde_json::Value,
    pub cpu_info: serde_json::Value,
    pub hypervisor_type: String,
    pub disabled: bool,
    pub agent_down: bool,
    pub computed_at: DateTime<Utc>,
}

impl HostCapabilities {
    pub fn trait_set(&self) -> Vec<String> {
        self.traits
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn replace_all(rows: Vec<Self>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(feature_capabilities::table)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(feature_capabilities::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn as_map(conn: &mut Conn<'_>) -> Result<HashMap<String, Self>, Error> {
        let rows: Vec<Self> = feature_capabilities::table.get_results(conn).await?;
        Ok(rows.into_iter().map(|r| (r.host_name.clone(), r)).collect())
    }
}
