//! `openstack_aggregates`: host → aggregate-uuid membership, from which
//! the `feature_az` extractor (§4.6, Scenario 1) derives the host → AZ
//! assignment. Replace-all discipline (§4.1).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::openstack_aggregates;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_aggregates)]
pub struct Aggregate {
    pub id: i64,
    pub host_name: String,
    pub aggregate_uuid: Uuid,
    pub az_name: Option<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = openstack_aggregates)]
pub struct NewAggregate {
    pub host_name: String,
    pub aggregate_uuid: Uuid,
    pub az_name: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl Aggregate {
    pub async fn replace_all(rows: Vec<NewAggregate>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(openstack_aggregates::table)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(openstack_aggregates::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }
}
