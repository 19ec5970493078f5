//! `openstack_migrations`: in-flight server migrations, delta-synced by
//! id like `servers` (§4.1). Used by extractors that must not count a
//! server twice while it straddles source and destination host.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::openstack_migrations;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_migrations)]
pub struct Migration {
    pub id: Uuid,
    pub server_id: Uuid,
    pub source_host: Option<String>,
    pub dest_host: Option<String>,
    pub status: String,
    pub created: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = openstack_migrations)]
pub struct NewMigration {
    pub id: Uuid,
    pub server_id: Uuid,
    pub source_host: Option<String>,
    pub dest_host: Option<String>,
    pub status: String,
    pub created: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
}

impl Migration {
    pub async fn upsert(rows: Vec<NewMigration>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        Ok(diesel::insert_into(openstack_migrations::table)
            .values(&rows)
            .on_conflict(openstack_migrations::id)
            .do_update()
            .set((
                openstack_migrations::status
                    .eq(diesel::upsert::excluded(openstack_migrations::status)),
                openstack_migrations::dest_host
                    .eq(diesel::upsert::excluded(openstack_migrations::dest_host)),
                openstack_migrations::synced_at
                    .eq(diesel::upsert::excluded(openstack_migrations::synced_at)),
            ))
            .execute(conn)
            .await?)
    }
}
