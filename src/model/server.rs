//! `openstack_servers`: running workloads, synced with delta discipline
//! (§4.1) — upsert by primary key, row deletion on an explicit `DELETED`
//! status tombstone.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::openstack_servers;
use crate::db::Conn;

const DELETED_STATUS: &str = "DELETED";

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_servers)]
pub struct Server {
    pub id: Uuid,
    pub host_name: Option<String>,
    pub project_id: String,
    pub user_id: String,
    pub flavor_name: String,
    pub vcpus: i32,
    pub memory_mb: i32,
    pub disk_gb: i32,
    pub status: String,
    pub created: DateTime<Utc>,
    pub deleted: bool,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = openstack_servers)]
pub struct NewServer {
    pub id: Uuid,
    pub host_name: Option<String>,
    pub project_id: String,
    pub user_id: String,
    pub flavor_name: String,
    pub vcpus: i32,
    pub memory_mb: i32,
    pub disk_gb: i32,
    pub status: String,
    pub created: DateTime<Utc>,
    pub deleted: bool,
    pub synced_at: DateTime<Utc>,
}

impl Server {
    /// Applies one page of a `changes-since` delta: upserts by id, then
    /// deletes every row whose incoming status is the `DELETED`
    /// tombstone. Both phases run inside one transaction per §5.
    pub async fn apply_delta(rows: Vec<NewServer>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        let (tombstones, live): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|r| r.status == DELETED_STATUS);

        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    let mut written = 0;
                    if !live.is_empty() {
                        written += diesel::insert_into(openstack_servers::table)
                            .values(&live)
                            .on_conflict(openstack_servers::id)
                            .do_update()
                            .set((
                                openstack_servers::host_name.eq(diesel::upsert::excluded(
                                    openstack_servers::host_name,
                                )),
                                openstack_servers::status
                                    .eq(diesel::upsert::excluded(openstack_servers::status)),
                                openstack_servers::synced_at
                                    .eq(diesel::upsert::excluded(openstack_servers::synced_at)),
                            ))
                            .execute(conn)
                            .await?;
                    }
                    for tombstone in &tombstones {
                        written += diesel::delete(
                            openstack_servers::table.filter(openstack_servers::id.eq(tombstone.id)),
                        )
                        .execute(conn)
                        .await?;
                    }
                    Ok(written)
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn by_host(host_name: &str, conn: &mut Conn<'_>) -> Result<Vec<Self>, Error> {
        Ok(openstack_servers::table
            .filter(openstack_servers::host_name.eq(host_name))
            .filter(openstack_servers::deleted.eq(false))
            .get_results(conn)
            .await?)
    }

    pub async fn by_project(
        project_id: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Vec<Self>, Error> {
        Ok(openstack_servers::table
            .filter(openstack_servers::project_id.eq(project_id))
            .filter(openstack_servers::deleted.eq(false))
            .get_results(conn)
            .await?)
    }
}
