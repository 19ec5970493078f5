//! Persisted decision results (§3): immutable once written, never mutated
//! after a terminal status is set.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::decisions;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = decisions)]
pub struct NewDecision {
    pub id: Uuid,
    pub request_id: String,
    pub pipeline_name: String,
    pub target_host: Option<String>,
    pub ordered_hosts: serde_json::Value,
    pub raw_in_weights: serde_json::Value,
    pub normalized_in_weights: serde_json::Value,
    pub aggregated_out_weights: serde_json::Value,
    pub statistics: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl NewDecision {
    pub async fn persist(self, conn: &mut Conn<'_>) -> Result<(), Error> {
        diesel::insert_into(decisions::table)
            .values(self)
            .execute(conn)
            .await?;
        Ok(())
    }
}
