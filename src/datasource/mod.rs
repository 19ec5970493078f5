//! Datasource adapter framework (§4.1): one adapter per upstream, each
//! owning a fixed set of tables under either replace-all or delta
//! deletion discipline.

mod block_storage;
mod compute;
mod identity;
mod metrics_ts;
pub mod pagination;
mod placement;
mod registry;
mod share;

pub use block_storage::BlockStorageDatasource;
pub use compute::ComputeDatasource;
pub use identity::{IdentityClient, IdentityError};
pub use metrics_ts::MetricsDatasource;
pub use placement::PlacementDatasource;
pub use registry::Registry;
pub use share::ShareDatasource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use displaydoc::Display;
use thiserror::Error;

use crate::db::Pool;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// upstream unavailable: {0}
    Unavailable(#[from] reqwest::Error),
    /// upstream returned a malformed payload: {0}
    Malformed(String),
    /// database error: {0}
    Database(#[from] crate::db::Error),
    /// model error: {0}
    Model(anyhow::Error),
    /// identity auth failure: {0}
    Identity(#[from] IdentityError),
    /// configuration fault: unknown datasource type {0:?}
    UnknownType(String),
}

/// Outcome of one `Sync` call: rows written, and the recommended next
/// run time (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    pub rows_written: u64,
    pub next_due: DateTime<Utc>,
}

/// Which discipline an adapter uses to reconcile deletions (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionDiscipline {
    /// The new snapshot fully replaces the old inside one transaction.
    ReplaceAll,
    /// Upsert by primary key; explicit `DELETED` rows delete.
    Delta,
}

/// The capability set every adapter implements: `Init` (idempotent
/// table/schema setup, auth, endpoint discovery) and `Sync` (fetch +
/// upsert + bookmark). Modeled as a flat trait plus a name→factory
/// registry (§9), not deep inheritance.
#[async_trait]
pub trait Datasource: Send + Sync {
    fn name(&self) -> &'static str;

    fn deletion_discipline(&self) -> DeletionDiscipline;

    async fn init(&self, pool: &Pool) -> Result<(), Error>;

    async fn sync(&self, pool: &Pool) -> Result<SyncOutcome, Error>;
}
