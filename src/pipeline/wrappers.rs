//! The three wrappers §4.4 says decorate every step uniformly: Scope
//! (compute the scoped view, reassemble after), Monitor (duration +
//! removal/delta stats), Validate (weigher output-keyset invariant).

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::warn;

use crate::config::StepConfig;
use crate::model::feature::capabilities::HostCapabilities;
use crate::model::HostName;
use crate::monitor::Monitor;

use super::activation::{merge_additive, ActivationMap};
use super::feature_source::FeatureSource;
use super::request::Request;
use super::step::{Step, StepKind};

const SAME_SUBJECT_VALIDATION: &str = "sameSubjectNumberInOut";

/// Runs one configured step against the running accumulator, applying
/// the Scope, Monitor, and Validate wrappers in the order §4.4
/// describes. Mutates `acc` in place; never returns an error for a
/// step-internal fault — those are logged and treated as a no-op
/// contribution, matching §7's "internal" taxonomy entry.
#[allow(clippy::too_many_arguments)]
pub async fn run_step(
    step: &dyn Step,
    step_config: &StepConfig,
    features: &mut dyn FeatureSource,
    acc: &mut ActivationMap,
    full_hosts: &[HostName],
    capabilities: &HashMap<HostName, HostCapabilities>,
    request: &Request,
    monitor: &Monitor,
) {
    // Scope wrapper: resolve the step's view before it runs.
    if step_config
        .scope
        .as_ref()
        .map(|s| s.should_skip(&request.spec))
        .unwrap_or(false)
    {
        monitor.record_step_skipped(step.name());
        return;
    }

    let resolved = step_config
        .scope
        .as_ref()
        .map(|s| s.resolve_hosts(full_hosts, capabilities))
        .unwrap_or_else(|| full_hosts.to_vec());
    let scope: Vec<HostName> = resolved.into_iter().filter(|h| acc.contains_key(h)).collect();
    let scoped_view: ActivationMap = scope
        .iter()
        .filter_map(|h| acc.get(h).map(|v| (h.clone(), *v)))
        .collect();

    // Monitor wrapper: time the invocation.
    let start = Instant::now();
    let result = step.run(features, &scoped_view, request, &step_config.opts).await;
    monitor.record_step_run(step.name(), start.elapsed().as_secs_f64());

    let delta = match result {
        Ok(delta) => delta,
        Err(e) => {
            warn!(step = step.name(), error = %e, "step run failed, output discarded");
            monitor.record_step_skipped(step.name());
            return;
        }
    };

    // Validate wrapper: a weigher must not change the key set.
    if step.kind() == StepKind::Weigher
        && !step_config
            .disabled_validations
            .iter()
            .any(|v| v == SAME_SUBJECT_VALIDATION)
    {
        let expected: HashSet<&HostName> = scope.iter().collect();
        let actual: HashSet<&HostName> = delta.keys().collect();
        if expected != actual {
            warn!(
                step = step.name(),
                "weigher changed subject count, discarding its output"
            );
            monitor.record_step_skipped(step.name());
            return;
        }
    }

    merge_additive(acc, &scope, &delta);
}
