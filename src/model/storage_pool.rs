//! `openstack_storage_pools`: the block-storage (cinder) and shared-file
//! (manila) backend pools a volume/share request may land on.
//! Replace-all discipline (§4.1).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;

use super::schema::openstack_storage_pools;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_storage_pools)]
pub struct StoragePool {
    pub id: String,
    pub pool_name: String,
    pub backend: String,
    pub capacity_gb: i64,
    pub free_gb: i64,
    pub allocated_gb: i64,
    pub availability_zone: Option<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = openstack_storage_pools)]
pub struct NewStoragePool {
    pub id: String,
    pub pool_name: String,
    pub backend: String,
    pub capacity_gb: i64,
    pub free_gb: i64,
    pub allocated_gb: i64,
    pub availability_zone: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl StoragePool {
    pub async fn replace_all(rows: Vec<NewStoragePool>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(openstack_storage_pools::table)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(openstack_storage_pools::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }
}
