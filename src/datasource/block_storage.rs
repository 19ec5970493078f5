//! Block-storage (cinder) datasource adapter (§3, §4.1): storage pools
//! offered by the volume service, replace-all discipline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::config::DatasourceConfig;
use crate::db::Pool;
use crate::model::{storage_pool::NewStoragePool, SyncBookmark};

use super::identity::IdentityClient;
use super::{DeletionDiscipline, Datasource, Error};

const NAME: &str = "block_storage";

#[derive(Debug, Deserialize)]
struct PoolCapabilities {
    pool_name: String,
    #[serde(default)]
    total_capacity_gb: f64,
    #[serde(default)]
    free_capacity_gb: f64,
    #[serde(default)]
    allocated_capacity_gb: f64,
    #[serde(rename = "availability_zone", default)]
    availability_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoolDto {
    name: String,
    capabilities: PoolCapabilities,
}

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    pools: Vec<PoolDto>,
}

pub struct BlockStorageDatasource {
    http: reqwest::Client,
    identity: Arc<IdentityClient>,
    #[allow(dead_code)]
    config: DatasourceConfig,
}

impl BlockStorageDatasource {
    pub fn new(
        http: reqwest::Client,
        identity: Arc<IdentityClient>,
        config: DatasourceConfig,
    ) -> Self {
        Self { http, identity, config }
    }
}

#[async_trait]
impl Datasource for BlockStorageDatasource {
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
        let endpoint = self
            .identity
            .endpoint("volumev3", "public")
            .await
            .map_err(Error::Identity)?;
        let token = self.identity.bearer_token().await.map_err(Error::Identity)?;

        let response: PoolsResponse = self
            .http
            .get(format!("{endpoint}/scheduler-stats/get_pools?detail=True"))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;

        let now = Utc::now();
        let rows: Vec<NewStoragePool> = response
            .pools
            .into_iter()
            .map(|p| NewStoragePool {
                id: format!("{}#{}", p.name, p.capabilities.pool_name),
                pool_name: p.capabilities.pool_name,
                backend: "cinder".to_string(),
                capacity_gb: p.capabilities.total_capacity_gb as i64,
                free_gb: p.capabilities.free_capacity_gb as i64,
                allocated_gb: p.capabilities.allocated_capacity_gb as i64,
                availability_zone: p.capabilities.availability_zone,
                synced_at: now,
            })
            .collect();
        let rows_written = rows.len() as u64;

        let mut conn = pool.conn().await?;
        crate::model::storage_pool::StoragePool::replace_all(rows, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        SyncBookmark::record_success(NAME, rows_written as i64, now, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;

        Ok(super::SyncOutcome {
            rows_written,
            next_due: Utc::now() + chrono::Duration::seconds(120),
        })
    }
}
