//! `openstack_flavors`: the static size catalog (vcpus/memory/disk/extra
//! specs) datasource-synced with replace-all discipline (§4.1).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::openstack_flavors;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_flavors)]
pub struct Flavor {
    pub id: Uuid,
    pub name: String,
    pub vcpus: i32,
    pub memory_mb: i32,
    pub disk_gb: i32,
    pub extra_specs: serde_json::Value,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = openstack_flavors)]
pub struct NewFlavor {
    pub id: Uuid,
    pub name: String,
    pub vcpus: i32,
    pub memory_mb: i32,
    pub disk_gb: i32,
    pub extra_specs: serde_json::Value,
    pub synced_at: DateTime<Utc>,
}

impl Flavor {
    pub async fn replace_all(rows: Vec<NewFlavor>, conn: &mut Conn<'_>) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(openstack_flavors::table).execute(conn).await?;
                    diesel::insert_into(openstack_flavors::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn by_name(name: &str, conn: &mut Conn<'_>) -> Result<Option<Self>, Error> {
        Ok(openstack_flavors::table
            .filter(openstack_flavors::name.eq(name))
            .first(conn)
            .await
            .optional()?)
    }
}
