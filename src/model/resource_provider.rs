//! `openstack_resource_providers` and `openstack_resource_provider_traits`:
//! placement's resource providers and their trait tags (§3). Traits are
//! unique per (provider, name); the provider's `generation` is monotonic
//! and owned entirely by the upstream placement service.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

use super::schema::{openstack_resource_provider_traits, openstack_resource_providers};
use crate::db::Conn;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = openstack_resource_providers)]
pub struct ResourceProvider {
    pub id: Uuid,
    pub name: String,
    pub host_name: Option<String>,
    pub generation: i64,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = openstack_resource_providers)]
pub struct NewResourceProvider {
    pub id: Uuid,
    pub name: String,
    pub host_name: Option<String>,
    pub generation: i64,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = openstack_resource_provider_traits)]
pub struct ResourceProviderTrait {
    pub resource_provider_id: Uuid,
    pub trait_name: String,
    pub synced_at: DateTime<Utc>,
}

impl ResourceProvider {
    pub async fn replace_all(
        providers: Vec<NewResourceProvider>,
        traits: Vec<ResourceProviderTrait>,
        conn: &mut Conn<'_>,
    ) -> Result<usize, Error> {
        conn.build_transaction()
            .run(|conn| {
                Box::pin(async move {
                    diesel::delete(openstack_resource_provider_traits::table)
                        .execute(conn)
                        .await?;
                    diesel::delete(openstack_resource_providers::table)
                        .execute(conn)
                        .await?;
                    let n = diesel::insert_into(openstack_resource_providers::table)
                        .values(&providers)
                        .execute(conn)
                        .await?;
                    diesel::insert_into(openstack_resource_provider_traits::table)
                        .values(&traits)
                        .execute(conn)
                        .await?;
                    Ok(n)
                })
            })
            .await
            .map_err(Error::Database)
    }

    pub async fn traits_for_host(
        host_name: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Vec<String>, Error> {
        let names = openstack_resource_providers::table
            .inner_join(
                openstack_resource_provider_traits::table.on(
                    openstack_resource_provider_traits::resource_provider_id
                        .eq(openstack_resource_providers::id),
                ),
            )
            .filter(openstack_resource_providers::host_name.eq(host_name))
            .select(openstack_resource_provider_traits::trait_name)
            .get_results(conn)
            .await?;
        Ok(names)
    }
}
