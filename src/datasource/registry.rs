//! Name → factory table for datasource adapters (§9): the reconciler and
//! the sync scheduler both look adapters up by configured name rather
//! than matching on a closed enum, so adding an adapter never touches
//! either caller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, DatasourceConfig};

use super::block_storage::BlockStorageDatasource;
use super::compute::ComputeDatasource;
use super::identity::{IdentityClient, IdentityCredentials};
use super::metrics_ts::MetricsDatasource;
use super::placement::PlacementDatasource;
use super::share::ShareDatasource;
use super::Datasource;

/// Holds one boxed adapter per configured datasource, keyed by its
/// configured name (§6 "datasources").
pub struct Registry {
    adapters: HashMap<String, Arc<dyn Datasource>>,
}

impl Registry {
    pub fn build(config: &Config) -> Self {
        let http = reqwest::Client::new();
        let identity = IdentityClient::new(
            http.clone(),
            IdentityCredentials {
                auth_url: config.global.identity_auth_url.clone(),
                username: config.global.identity_username.clone(),
                password: config.global.identity_password.to_string(),
            },
        );

        let mut adapters: HashMap<String, Arc<dyn Datasource>> = HashMap::new();
        for ds in &config.datasources {
            let adapter = build_one(http.clone(), identity.clone(), ds);
            adapters.insert(ds.name.clone(), adapter);
        }
        Self { adapters }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Datasource>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

fn build_one(
    http: reqwest::Client,
    identity: Arc<IdentityClient>,
    config: &DatasourceConfig,
) -> Arc<dyn Datasource> {
    use crate::config::DatasourceType::*;

    if config.types.iter().any(|t| matches!(t, StoragePools)) {
        return match config.name.as_str() {
            "share" => Arc::new(ShareDatasource::new(http, identity, config.clone())),
            _ => Arc::new(BlockStorageDatasource::new(http, identity, config.clone())),
        };
    }
    if config
        .types
        .iter()
        .any(|t| matches!(t, ResourceProviders | Traits | InventoryUsages | Aggregates))
    {
        return Arc::new(PlacementDatasource::new(http, identity, config.clone()));
    }
    if config.name == "metrics_ts" {
        return Arc::new(MetricsDatasource::new(http, identity, config.clone()));
    }
    Arc::new(ComputeDatasource::new(http, identity, config.clone()))
}
