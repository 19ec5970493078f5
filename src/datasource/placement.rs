//! Placement datasource adapter (§3, §4.1): resource providers, their
//! trait tags, and aggregate membership — all replace-all, since
//! placement has no incremental `changes-since` query for these
//! collections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::DatasourceConfig;
use crate::db::Pool;
use crate::model::{
    aggregate::NewAggregate,
    resource_provider::{NewResourceProvider, ResourceProvider, ResourceProviderTrait},
    SyncBookmark,
};

use super::identity::IdentityClient;
use super::{DeletionDiscipline, Datasource, Error};

const NAME: &str = "placement";

/// Bound on concurrent per-provider trait fetches (§4.1, §5 default-8
/// fan-out guidance).
const TRAIT_FETCH_PARALLELISM: usize = 8;
/// Upper bound on the jitter applied before each dispatch, so a large
/// provider list doesn't open every connection to placement at once.
const MAX_DISPATCH_JITTER_MILLIS: u64 = 50;

#[derive(Debug, Deserialize)]
struct ResourceProviderDto {
    uuid: Uuid,
    name: String,
    generation: i64,
}

#[derive(Debug, Deserialize)]
struct ResourceProvidersResponse {
    resource_providers: Vec<ResourceProviderDto>,
}

#[derive(Debug, Deserialize)]
struct TraitsResponse {
    traits: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateDto {
    host_name: String,
    aggregate_uuid: Uuid,
    #[serde(default)]
    az_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    aggregates: Vec<AggregateDto>,
}

pub struct PlacementDatasource {
    http: reqwest::Client,
    identity: Arc<IdentityClient>,
    #[allow(dead_code)]
    config: DatasourceConfig,
}

impl PlacementDatasource {
    pub fn new(
        http: reqwest::Client,
        identity: Arc<IdentityClient>,
        config: DatasourceConfig,
    ) -> Self {
        Self { http, identity, config }
    }
}

#[async_trait]
impl Datasource for PlacementDatasource {
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
            .endpoint("placement", "public")
            .await
            .map_err(Error::Identity)?;
        let token = self.identity.bearer_token().await.map_err(Error::Identity)?;

        let providers_response: ResourceProvidersResponse = self
            .http
            .get(format!("{endpoint}/resource_providers"))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| Error::Malformed(e.to_string()))?;

        let now = Utc::now();

        // Fan out the per-provider trait fetch (§4.1): each worker
        // fetches and returns its own partial result rather than
        // touching a shared slice, and this loop is the single owner
        // that appends them (§9 "lock-protected shared append"). The
        // stream is bounded to `TRAIT_FETCH_PARALLELISM` in flight and
        // dropped on the first error, which cancels the remaining
        // unpolled fetches.
        let fetches = providers_response.resource_providers.iter().map(|p| {
            let http = self.http.clone();
            let endpoint = endpoint.clone();
            let token = token.clone();
            async move {
                let jitter = rand::thread_rng().gen_range(0..=MAX_DISPATCH_JITTER_MILLIS);
                tokio::time::sleep(Duration::from_millis(jitter)).await;

                let traits_response: TraitsResponse = http
                    .get(format!("{endpoint}/resource_providers/{}/traits", p.uuid))
                    .bearer_auth(&token)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
                    .map_err(|e| Error::Malformed(e.to_string()))?;

                let traits = traits_response
                    .traits
                    .into_iter()
                    .map(|trait_name| ResourceProviderTrait {
                        resource_provider_id: p.uuid,
                        trait_name,
                        synced_at: now,
                    })
                    .collect::<Vec<_>>();
                let provider = NewResourceProvider {
                    id: p.uuid,
                    name: p.name.clone(),
                    host_name: Some(p.name.clone()),
                    generation: p.generation,
                    synced_at: now,
                };
                Ok::<_, Error>((provider, traits))
            }
        });

        let mut results = stream::iter(fetches).buffer_unordered(TRAIT_FETCH_PARALLELISM);
        let mut new_providers = Vec::with_capacity(providers_response.resource_providers.len());
        let mut all_traits = Vec::new();
        while let Some(result) = results.next().await {
            let (provider, traits) = result?;
            new_providers.push(provider);
            all_traits.extend(traits);
        }
        let provider_count = new_providers.len() as u64;

        let aggregates_response: AggregatesResponse = self
            .http
            .get(format!("{endpoint}/resource_providers/aggregates"))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .unwrap_or(AggregatesResponse { aggregates: vec![] });
        let new_aggregates: Vec<NewAggregate> = aggregates_response
            .aggregates
            .into_iter()
            .map(|a| NewAggregate {
                host_name: a.host_name,
                aggregate_uuid: a.aggregate_uuid,
                az_name: a.az_name,
                synced_at: now,
            })
            .collect();
        let aggregate_count = new_aggregates.len() as u64;

        let mut conn = pool.conn().await?;
        ResourceProvider::replace_all(new_providers, all_traits, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;
        crate::model::aggregate::Aggregate::replace_all(new_aggregates, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;

        let rows_written = provider_count + aggregate_count;
        SyncBookmark::record_success(NAME, rows_written as i64, now, &mut conn)
            .await
            .map_err(|e| Error::Model(e.into()))?;

        Ok(super::SyncOutcome {
            rows_written,
            next_due: Utc::now() + chrono::Duration::seconds(90),
        })
    }
}
