//! The leaf step contract (§4.6): `Init` validates options once at
//! startup, `Run` is invoked once per request against the step's scoped
//! view of the activation map. Steps are stateless across requests and
//! must not perform I/O beyond the declared database reads.

use async_trait::async_trait;
use displaydoc::Display;
use thiserror::Error;

use super::activation::ActivationMap;
use super::feature_source::FeatureSource;
use super::request::Request;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// database error: {0}
    Database(#[from] diesel::result::Error),
    /// invalid step options: {0}
    InvalidOptions(String),
    /// zero-division: flavor {0:?} requires zero of a resource per instance
    ZeroDivision(String),
    /// feature lookup failed: {0}
    Feature(String),
}

/// Whether a step may remove hosts (a filter) or only adjust activations
/// (a weigher). Drives the `ValidateWrapper`'s post-condition (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Filter,
    Weigher,
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> StepKind;

    /// Validates `opts` once at startup; implementations that accept no
    /// options should still reject unknown fields to honor §9 "config
    /// with recognized options".
    fn init(&self, opts: &serde_json::Value) -> Result<(), Error>;

    /// Runs against `scope`, the subset of the accumulator this step is
    /// configured to see, returning activations for exactly that subset
    /// (minus any hosts a filter removes). `opts` is this step's
    /// configured options object, the same value already validated by
    /// `init` — the runtime instantiates a fresh logical step per run
    /// (§2) but shares the stateless implementation, so options travel
    /// with the call rather than with constructor state.
    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        opts: &serde_json::Value,
    ) -> Result<ActivationMap, Error>;
}
