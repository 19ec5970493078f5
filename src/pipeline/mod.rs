//! Pipeline runtime (§4.4): given a request, looks up a named pipeline,
//! instantiates a fresh per-run activation map over the input
//! candidates, threads it through each configured step, and returns an
//! ordered decision.

pub mod activation;
pub mod decision;
pub mod feature_source;
pub mod registry;
pub mod request;
pub mod scope;
pub mod step;
pub mod wrappers;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use displaydoc::Display;
use thiserror::Error;

use crate::config::Config;
use crate::db::Pool;
use crate::model::feature::capabilities::HostCapabilities;
use crate::model::HostName;
use crate::monitor::Monitor;

use activation::{normalize_min_max, seed, ActivationMap};
use decision::{DecisionResult, StatisticLabel};
use registry::StepRegistry;
use request::Request;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// request rejected: {0}
    Rejected(String),
    /// database error: {0}
    Database(#[from] crate::db::Error),
    /// feature lookup failed: {0}
    Feature(String),
    /// step {0:?} in pipeline {1:?} rejected its configured options: {2}
    StepConfig(String, String, step::Error),
    /// pipeline {0:?} configures unknown step implementation {1:?}
    UnknownStep(String, String),
}

pub struct Runtime {
    config: Config,
    steps: StepRegistry,
}

impl Runtime {
    /// Builds a runtime and validates every configured step's `opts`
    /// against its own `Step::init` (§7 "configuration fault ...
    /// surfaced at initialization; the component refuses to start").
    pub fn new(config: Config) -> Result<Self, Error> {
        let steps = StepRegistry::with_builtins();
        for pipeline in &config.pipelines {
            for step_config in &pipeline.steps {
                let Some(step) = steps.get(&step_config.implementation) else {
                    return Err(Error::UnknownStep(
                        pipeline.name.clone(),
                        step_config.implementation.clone(),
                    ));
                };
                step.init(&step_config.opts).map_err(|e| {
                    Error::StepConfig(pipeline.name.clone(), step_config.implementation.clone(), e)
                })?;
            }
        }
        Ok(Self { config, steps })
    }

    /// Runs the full request-processing contract of §4.4, steps 1–7.
    pub async fn decide(
        &self,
        request: Request,
        pool: &Pool,
        monitor: &Monitor,
    ) -> Result<DecisionResult, Error> {
        let start = Instant::now();

        // Step 1: validate candidate/weight correspondence.
        let host_set: HashSet<&HostName> = request.hosts.iter().collect();
        let weight_set: HashSet<&HostName> = request.weights.keys().collect();
        if host_set != weight_set {
            return Err(Error::Rejected(
                "candidate set and weight-map key set must match exactly".into(),
            ));
        }

        // Step 2: select the pipeline.
        let pipeline_name = request.pipeline.as_deref().unwrap_or("default");
        let pipeline_config = self
            .config
            .pipeline(pipeline_name)
            .or_else(|| self.config.pipeline("default"))
            .ok_or_else(|| Error::Rejected(format!("unknown pipeline {pipeline_name:?}")))?
            .clone();

        // Step 3: seed the accumulator.
        let mut acc: ActivationMap = seed(&request.hosts);

        let mut conn = pool.conn().await?;
        let capabilities: HashMap<HostName, HostCapabilities> =
            HostCapabilities::as_map(&mut conn)
                .await
                .map_err(|e| Error::Feature(e.to_string()))?;

        // Step 4: run each configured step in order.
        {
            let mut features = feature_source::ConnFeatureSource::new(&mut conn);
            for step_config in &pipeline_config.steps {
                let Some(step) = self.steps.get(&step_config.implementation) else {
                    return Err(Error::Rejected(format!(
                        "unknown step implementation {:?}",
                        step_config.implementation
                    )));
                };
                wrappers::run_step(
                    step.as_ref(),
                    step_config,
                    &mut features,
                    &mut acc,
                    &request.hosts,
                    &capabilities,
                    &request,
                    monitor,
                )
                .await;
            }
        }

        // Step 5: final score = normalized caller weight + aggregate,
        // normalized over the surviving hosts only — a filtered-out
        // candidate's extreme weight must not skew the min/max of the
        // hosts actually still in contention.
        let surviving_weights: HashMap<HostName, f64> = acc
            .keys()
            .filter_map(|host| request.weights.get(host).map(|w| (host.clone(), *w)))
            .collect();
        let normalized = normalize_min_max(&surviving_weights);
        let mut final_scores: HashMap<HostName, f64> = HashMap::new();
        for host in acc.keys() {
            let normalized_weight = normalized.get(host).copied().unwrap_or(0.5);
            let aggregate = acc.get(host).copied().unwrap_or(0.0);
            final_scores.insert(host.clone(), normalized_weight + aggregate);
        }

        // Step 6: sort descending, tie-break lexicographically.
        let mut ordered: Vec<HostName> = final_scores.keys().cloned().collect();
        ordered.sort_by(|a, b| {
            let score_a = final_scores[a];
            let score_b = final_scores[b];
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });

        let raw_in_weights: HashMap<HostName, f64> = request.weights.clone();
        let mut statistics = HashMap::new();
        statistics.insert(
            "final_score".to_string(),
            StatisticLabel {
                unit: "score".to_string(),
                subjects: final_scores,
            },
        );

        let result = DecisionResult::new(ordered, raw_in_weights, normalized, acc, statistics);

        monitor.record_pipeline_run(pipeline_name, start.elapsed().as_secs_f64());
        monitor.record_request_processed("pipeline");

        let status = if result.ordered_hosts.is_empty() {
            "empty"
        } else {
            "ok"
        };
        result
            .persist(&request.context.request_id, pipeline_name, status, &mut conn)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;

        Ok(result)
    }
}
