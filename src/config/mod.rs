//! Configuration surface (§6): one struct per concern, options enumerated
//! rather than a free-form map. Follows the teacher's `Provider`
//! dual-source (env var first, then a TOML entry) pattern for the few
//! values operators most often override per-environment (DSN,
//! credentials), and plain `serde` deserialization for the larger,
//! operator-authored lists (datasources, extractors, pipelines).

pub mod context;
pub mod log;
mod provider;

use std::path::Path;
use std::time::Duration;

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use context::Context;
pub use provider::Provider;

use crate::db::DbOptions;

const DATABASE_URL_VAR: &str = "DATABASE_URL";
const DATABASE_URL_ENTRY: &str = "global.database_url";
const DB_MAX_CONN_VAR: &str = "DB_MAX_CONN";
const DB_MAX_CONN_ENTRY: &str = "global.db_max_conn";
const DB_MIN_CONN_VAR: &str = "DB_MIN_CONN";
const DB_MIN_CONN_ENTRY: &str = "global.db_min_conn";
const OPERATOR_VAR: &str = "OPERATOR_ID";
const OPERATOR_ENTRY: &str = "global.operator_id";
const HTTP_ADDR_VAR: &str = "HTTP_ADDR";
const HTTP_ADDR_ENTRY: &str = "global.http_addr";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Display, Error)]
pub enum Error {
    /// failed to read config file {0}: {1}
    ReadFile(String, std::io::Error),
    /// failed to parse config toml: {0}
    ParseToml(#[from] toml::de::Error),
    /// {DATABASE_URL_ENTRY:?} not present: {0}
    MissingDatabaseUrl(provider::Error),
    /// {OPERATOR_ENTRY:?} not present: {0}
    MissingOperator(provider::Error),
    /// failed to parse {DB_MAX_CONN_ENTRY:?}: {0}
    ParseMaxConn(provider::Error),
    /// failed to parse {DB_MIN_CONN_ENTRY:?}: {0}
    ParseMinConn(provider::Error),
    /// failed to parse {HTTP_ADDR_ENTRY:?}: {0}
    ParseHttpAddr(provider::Error),
}

/// A duration expressed with a human-friendly suffix in TOML (`"30s"`,
/// `"5m"`), mirroring the teacher's `HumanTime` newtype.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct HumanTime(#[serde(with = "humantime_serde")] pub Duration);

impl std::ops::Deref for HumanTime {
    type Target = Duration;
    fn deref(&self) -> &Duration {
        &self.0
    }
}

/// Global section: operator identity, database DSN, auth credentials,
/// monitoring registry label set.
#[derive(Clone, Debug)]
pub struct GlobalConfig {
    pub operator_id: String,
    pub database: DbOptions,
    pub monitor_labels: Vec<(String, String)>,
    pub identity_auth_url: String,
    pub identity_username: String,
    pub identity_password: zeroize::Zeroizing<String>,
    pub http_addr: String,
}

/// Availability scope a datasource adapter authenticates against.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Public,
    Internal,
    Admin,
}

/// Entity types a datasource adapter is configured to sync.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceType {
    Servers,
    DeletedServers,
    Hypervisors,
    Flavors,
    Migrations,
    Aggregates,
    ResourceProviders,
    Traits,
    InventoryUsages,
    StoragePools,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatasourceConfig {
    pub name: String,
    pub availability: Availability,
    pub types: Vec<DatasourceType>,
    pub delta_window_minutes: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractorConfig {
    pub name: String,
    pub recency_seconds: Option<u64>,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,
    #[serde(rename = "impl")]
    pub implementation: String,
    #[serde(default)]
    pub scope: Option<crate::pipeline::scope::ScopeConfig>,
    #[serde(default)]
    pub opts: serde_json::Value,
    #[serde(default)]
    pub disabled_validations: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub name: String,
    pub steps: Vec<StepConfig>,
}

/// Top-level document: everything the operator authors in `config.toml`
/// plus environment overrides for the global section.
#[derive(Clone, Debug)]
pub struct Config {
    pub global: GlobalConfig,
    pub datasources: Vec<DatasourceConfig>,
    pub extractors: Vec<ExtractorConfig>,
    pub pipelines: Vec<PipelineConfig>,
}

/// The subset of `Config` that is authored directly as TOML (everything
/// except the env-overridable global section).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    datasources: Vec<DatasourceConfig>,
    #[serde(default)]
    extractors: Vec<ExtractorConfig>,
    #[serde(default)]
    pipelines: Vec<PipelineConfig>,
}

impl Config {
    pub fn new() -> Result<Self, Error> {
        let provider = Provider::from_env();
        Self::assemble(provider, Document {
            datasources: vec![],
            extractors: vec![],
            pipelines: vec![],
        })
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::ReadFile(path.display().to_string(), e))?;
        let document: Document = toml::from_str(&raw)?;
        let provider = Provider::from_env_and_toml(&raw)?;
        Self::assemble(provider, document)
    }

    pub fn from_default_toml() -> Result<Self, Error> {
        Self::from_toml_file("config.toml")
    }

    fn assemble(provider: Provider, document: Document) -> Result<Self, Error> {
        let database_url: String = provider
            .read(DATABASE_URL_VAR, DATABASE_URL_ENTRY)
            .map_err(Error::MissingDatabaseUrl)?;
        let max_conns: u32 = provider
            .read_or(DB_MAX_CONN_VAR, DB_MAX_CONN_ENTRY, 10)
            .map_err(Error::ParseMaxConn)?;
        let min_conns: u32 = provider
            .read_or(DB_MIN_CONN_VAR, DB_MIN_CONN_ENTRY, 2)
            .map_err(Error::ParseMinConn)?;
        let operator_id: String = provider
            .read(OPERATOR_VAR, OPERATOR_ENTRY)
            .map_err(Error::MissingOperator)?;
        let http_addr: String = provider
            .read_or(HTTP_ADDR_VAR, HTTP_ADDR_ENTRY, DEFAULT_HTTP_ADDR.to_string())
            .map_err(Error::ParseHttpAddr)?;

        let global = GlobalConfig {
            operator_id,
            http_addr,
            database: DbOptions {
                url: database_url,
                max_conns,
                min_conns,
            },
            monitor_labels: vec![],
            identity_auth_url: provider
                .read_or(
                    "IDENTITY_AUTH_URL",
                    "global.identity_auth_url",
                    "http://keystone.local/v3".to_string(),
                )
                .unwrap_or_else(|_| "http://keystone.local/v3".to_string()),
            identity_username: provider
                .read_or("IDENTITY_USERNAME", "global.identity_username", String::new())
                .unwrap_or_default(),
            identity_password: zeroize::Zeroizing::new(
                provider
                    .read_or("IDENTITY_PASSWORD", "global.identity_password", String::new())
                    .unwrap_or_default(),
            ),
        };

        Ok(Config {
            global,
            datasources: document.datasources,
            extractors: document.extractors,
            pipelines: document.pipelines,
        })
    }

    /// The pipeline named `default` for a given resource type is required
    /// by §4.4; callers look pipelines up by exact name and fall back to
    /// `"default"`.
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }
}
