//! Compute (nova) datasource adapter (§3, §4.1): hypervisors and flavors
//! under replace-all discipline, servers and migrations under delta —
//! fetched as one fan-out of upstream calls per sync tick (§5).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::DatasourceConfig;
use crate::db::Pool;
use crate::model::{
    flavor::{Flavor, NewFlavor},
    hypervisor::NewHypervisor,
    migration::NewMigration,
    server::NewServer,
    SyncBookmark,
};

use super::identity::IdentityClient;
use super::pagination::{fetch_all, Page};
use super::{DeletionDiscipline, Datasource, Error};

const NAME: &str = "compute";

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

fn next_link(links: &[Link]) -> Option<&str> {
    links.iter().find(|l| l.rel == "next").map(|l| l.href.as_str())
}

#[derive(Debug, Deserialize)]
struct HypervisorDto {
    id: Uuid,
    hypervisor_hostname: String,
    hypervisor_type: String,
    state: String,
    status: String,
    vcpus: i64,
    vcpus_used: i64,
    memory_mb: i64,
    memory_mb_used: i64,
    local_gb: i64,
    local_gb_used: i64,
    #[serde(default)]
    cpu_info: serde_json::Value,
    #[serde(default)]
    disabled_reason: Option<String>,
    #[serde(default)]
    availability_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HypervisorsPage {
    hypervisors: Vec<HypervisorDto>,
    #[serde(default, rename = "hypervisors_links")]
    links: Vec<Link>,
}

impl Page<HypervisorDto> for HypervisorsPage {
    fn items(self) -> Vec<HypervisorDto> {
        self.hypervisors
    }
    fn next_link(&self) -> Option<&str> {
        next_link(&self.links)
    }
}

#[derive(Debug, Deserialize)]
struct FlavorDto {
    id: Uuid,
    name: String,
    vcpus: i32,
    ram: i32,
    disk: i32,
    #[serde(default)]
    extra_specs: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FlavorsPage {
    flavors: Vec<FlavorDto>,
    #[serde(default, rename = "flavors_links")]
    links: Vec<Link>,
}

impl Page<FlavorDto> for FlavorsPage {
    fn items(self) -> Vec<FlavorDto> {
        self.flavors
    }
    fn next_link(&self) -> Option<&str> {
        next_link(&self.links)
    }
}

#[derive(Debug, Deserialize)]
struct ServerDto {
    id: Uuid,
    #[serde(rename = "OS-EXT-SRV-ATTR:host")]
    host: Option<String>,
    tenant_id: String,
    user_id: String,
    #[serde(default)]
    flavor: ServerFlavorRef,
    status: String,
    created: chrono::DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerFlavorRef {
    #[serde(default)]
    original_name: String,
}

#[derive(Debug, Deserialize)]
struct ServersPage {
    servers: Vec<ServerDto>,
    #[serde(default, rename = "servers_links")]
    links: Vec<Link>,
}

impl Page<ServerDto> for ServersPage {
    fn items(self) -> Vec<ServerDto> {
        self.servers
    }
    fn next_link(&self) -> Option<&str> {
        next_link(&self.links)
    }
}

#[derive(Debug, Deserialize)]
struct MigrationDto {
    id: Uuid,
    instance_uuid: Uuid,
    source_compute: Option<String>,
    dest_compute: Option<String>,
    status: String,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MigrationsPage {
    migrations: Vec<MigrationDto>,
    #[serde(default, rename = "migrations_links")]
    links: Vec<Link>,
}

impl Page<MigrationDto> for MigrationsPage {
    fn items(self) -> Vec<MigrationDto> {
        self.migrations
    }
    fn next_link(&self) -> Option<&str> {
        next_link(&self.links)
    }
}

pub struct ComputeDatasource {
    http: reqwest::Client,
    identity: Arc<IdentityClient>,
    config: DatasourceConfig,
}

impl ComputeDatasource {
    pub fn new(
        http: reqwest::Client,
        identity: Arc<IdentityClient>,
        config: DatasourceConfig,
    ) -> Self {
        Self { http, identity, config }
    }

    async fn sync_hypervisors(&self, token: &str, endpoint: &str, pool: &Pool) -> Result<u64, Error> {
        let rows: Vec<HypervisorDto> =
            fetch_all::<HypervisorDto, HypervisorsPage>(&self.http, token, &format!("{endpoint}/os-hypervisors/detail"))
                .await?;
        let now = Utc::now();
        let new_rows: Vec<NewHypervisor> = rows
            .into_iter()
            .map(|d| NewHypervisor {
                id: d.id,
                host_name: d.hypervisor_hostname,
                hypervisor_type: d.hypervisor_type,
                state: d.state,
                status: d.status,
                vcpus: d.vcpus,
                vcpus_used: d.vcpus_used,
                memory_mb: d.memory_mb,
                memory_mb_used: d.memory_mb_used,
                local_gb: d.local_gb,
                local_gb_used: d.local_gb_used,
                cpu_info: d.cpu_info,
                disabled_reason: d.disabled_reason,
                availability_zone: d.availability_zone,
                synced_at: now,
            })
            .collect();
        let count = new_rows.len() as u64;
        let mut conn = pool.conn().await?;
        crate::model::hypervisor::Hypervisor::replace_all(new_rows, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        Ok(count)
    }

    async fn sync_flavors(&self, token: &str, endpoint: &str, pool: &Pool) -> Result<u64, Error> {
        let rows: Vec<FlavorDto> =
            fetch_all::<FlavorDto, FlavorsPage>(&self.http, token, &format!("{endpoint}/flavors/detail")).await?;
        let now = Utc::now();
        let new_rows: Vec<NewFlavor> = rows
            .into_iter()
            .map(|d| NewFlavor {
                id: d.id,
                name: d.name,
                vcpus: d.vcpus,
                memory_mb: d.ram,
                disk_gb: d.disk,
                extra_specs: d.extra_specs,
                synced_at: now,
            })
            .collect();
        let count = new_rows.len() as u64;
        let mut conn = pool.conn().await?;
        Flavor::replace_all(new_rows, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        Ok(count)
    }

    async fn sync_servers(&self, token: &str, endpoint: &str, pool: &Pool) -> Result<u64, Error> {
        let rows: Vec<ServerDto> = fetch_all::<ServerDto, ServersPage>(
            &self.http,
            token,
            &format!("{endpoint}/servers/detail?all_tenants=1"),
        )
        .await?;
        let now = Utc::now();
        let new_rows: Vec<NewServer> = rows
            .into_iter()
            .map(|d| NewServer {
                id: d.id,
                host_name: d.host,
                project_id: d.tenant_id,
                user_id: d.user_id,
                flavor_name: d.flavor.original_name,
                vcpus: 0,
                memory_mb: 0,
                disk_gb: 0,
                status: d.status,
                created: d.created,
                deleted: false,
                synced_at: now,
            })
            .collect();
        let count = new_rows.len() as u64;
        let mut conn = pool.conn().await?;
        crate::model::server::Server::apply_delta(new_rows, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        Ok(count)
    }

    async fn sync_migrations(&self, token: &str, endpoint: &str, pool: &Pool) -> Result<u64, Error> {
        let rows: Vec<MigrationDto> = fetch_all::<MigrationDto, MigrationsPage>(
            &self.http,
            token,
            &format!("{endpoint}/os-migrations"),
        )
        .await?;
        let now = Utc::now();
        let new_rows: Vec<NewMigration> = rows
            .into_iter()
            .map(|d| NewMigration {
                id: d.id,
                server_id: d.instance_uuid,
                source_host: d.source_compute,
                dest_host: d.dest_compute,
                status: d.status,
                created: d.created_at,
                synced_at: now,
            })
            .collect();
        let count = new_rows.len() as u64;
        let mut conn = pool.conn().await?;
        crate::model::migration::Migration::upsert(new_rows, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        Ok(count)
    }
}

#[async_trait]
impl Datasource for ComputeDatasource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn deletion_discipline(&self) -> DeletionDiscipline {
        DeletionDiscipline::ReplaceAll
    }

    async fn init(&self, pool: &Pool) -> Result<(), Error> {
        let mut conn = pool.conn().await?;
        SyncBookmark::record_success(NAME, 0, Utc::now(), &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        Ok(())
    }

    async fn sync(&self, pool: &Pool) -> Result<super::SyncOutcome, Error> {
        use crate::config::DatasourceType::*;

        let endpoint = self
            .identity
            .endpoint("compute", "public")
            .await
            .map_err(Error::Identity)?;
        let token = self.identity.bearer_token().await.map_err(Error::Identity)?;

        let mut rows_written = 0u64;
        for ty in &self.config.types {
            let written = match ty {
                Hypervisors => self.sync_hypervisors(&token, &endpoint, pool).await,
                Flavors => self.sync_flavors(&token, &endpoint, pool).await,
                Servers | DeletedServers => self.sync_servers(&token, &endpoint, pool).await,
                Migrations => self.sync_migrations(&token, &endpoint, pool).await,
                _ => continue,
            };
            match written {
                Ok(n) => rows_written += n,
                Err(e) => {
                    let mut conn = pool.conn().await?;
                    let _ = SyncBookmark::record_failure(NAME, &e.to_string(), &mut conn).await;
                    return Err(e);
                }
            }
        }

        let mut conn = pool.conn().await?;
        SyncBookmark::record_success(NAME, rows_written as i64, Utc::now(), &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;

        // Spread the next tick with jitter so a fleet of adapters doesn't
        // hammer the upstream in lockstep (§5).
        let jitter_seconds = rand::thread_rng().gen_range(0..30);
        Ok(super::SyncOutcome {
            rows_written,
            next_due: Utc::now() + chrono::Duration::seconds(60 + jitter_seconds),
        })
    }
}
