//! `nova_sync`: per-datasource sync bookmarks (§3). The incremental-sync
//! contract in §4.1 requires the timestamp to be persisted only *after*
//! a successful commit — never before — so a failed sync reprocesses the
//! same window on the next tick.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;

use super::schema::nova_sync;
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = nova_sync)]
pub struct SyncBookmark {
    pub datasource_name: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_object_count: i64,
    pub last_error: Option<String>,
}

impl SyncBookmark {
    pub async fn get(name: &str, conn: &mut Conn<'_>) -> Result<Option<Self>, Error> {
        Ok(nova_sync::table
            .filter(nova_sync::datasource_name.eq(name))
            .first(conn)
            .await
            .optional()?)
    }

    /// Records a successful sync: bumps `last_success_at` to `now` and
    /// clears any previous error.
    pub async fn record_success(
        name: &str,
        object_count: i64,
        now: DateTime<Utc>,
        conn: &mut Conn<'_>,
    ) -> Result<(), Error> {
        diesel::insert_into(nova_sync::table)
            .values((
                nova_sync::datasource_name.eq(name),
                nova_sync::last_success_at.eq(Some(now)),
                nova_sync::last_object_count.eq(object_count),
                nova_sync::last_error.eq(None::<String>),
            ))
            .on_conflict(nova_sync::datasource_name)
            .do_update()
            .set((
                nova_sync::last_success_at.eq(Some(now)),
                nova_sync::last_object_count.eq(object_count),
                nova_sync::last_error.eq(None::<String>),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Records a failure without touching `last_success_at` — the
    /// bookmark that gates the next retry window must stay put (§4.1,
    /// §7 "upstream unavailable").
    pub async fn record_failure(
        name: &str,
        error: &str,
        conn: &mut Conn<'_>,
    ) -> Result<(), Error> {
        diesel::insert_into(nova_sync::table)
            .values((
                nova_sync::datasource_name.eq(name),
                nova_sync::last_success_at.eq(None::<DateTime<Utc>>),
                nova_sync::last_object_count.eq(0),
                nova_sync::last_error.eq(Some(error.to_string())),
            ))
            .on_conflict(nova_sync::datasource_name)
            .do_update()
            .set(nova_sync::last_error.eq(Some(error.to_string())))
            .execute(conn)
            .await?;
        Ok(())
    }
}
