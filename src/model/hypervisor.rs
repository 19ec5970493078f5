//! `openstack_hypervisors`: per-compute-host static + dynamic attributes
//! owned by the compute datasource adapter under replace-all discipline
//! (§3, §4.1).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::openstack_hypervisors;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_hypervisors)]
pub struct Hypervisor {
    pub id: Uuid,
    pub host_name: String,
    pub hypervisor_type: String,
    pub state: String,
    pub status: String,
    pub vcpus: i64,
    pub vcpus_used: i64,
    pub memory_mb: i64,
    pub memory_mb_used: i64,
    pub local_gb: i64,
    pub local_gb_used: i64,
    pub cpu_info: serde_json::Value,
    pub disabled_reason: Option<String>,
    pub availability_zone: Option<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = openstack_hypervisors)]
pub struct NewHypervisor {
    pub id: Uuid,
    pub host_name: String,
    pub hypervisor_type: String,
    pub state: String,
    pub status: String,
    pub vcpus: i64,
    pub vcpus_used: i64,
    pub memory_mb: i64,
    pub memory_mb_used: i64,
    pub local_gb: i64,
    pub local_gb_used: i64,
    pub cpu_info: serde_json::Value,
    pub disabled_reason: Option<String>,
    pub availability_zone: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl Hypervisor {
    pub async fn all(conn: &mut Conn<'_>) -> Result<Vec<Self>, Error> {
        Ok(openstack_hypervisors::table.get_results(conn).await?)
    }

    pub async fn by_host(host_name: &str, conn: &mut Conn<'_>) -> Result<Option<Self>, Error> {
        Ok(openstack_hypervisors::table
            .filter(openstack_hypervisors::host_name.eq(host_name))
            .first(conn)
            .await
            .optional()?)
    }

    /// Whole-table replace, the discipline §4.1 prescribes for
    /// hypervisors: delete-then-insert inside one transaction so readers
    /// never observe a partial interleaving (§5, §8 invariant 4).
    pub async fn replace_all(rows: Vec<NewHypervisor>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(openstack_hypervisors::table)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(openstack_hypervisors::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }
}
