//! Activation map arithmetic (§4.4, §9): the pipeline is a left-fold over
//! steps, with a single accumulator owned by the runtime. Steps return a
//! delta map over their scoped hosts; the runtime merges it in, never the
//! other way around.

use std::collections::HashMap;

use crate::model::HostName;

pub type ActivationMap = HashMap<HostName, f64>;

/// Seeds the accumulator at zero over exactly the input candidates (§4.4
/// step 3).
pub fn seed(hosts: &[HostName]) -> ActivationMap {
    hosts.iter().cloned().map(|h| (h, 0.0)).collect()
}

/// Sums `delta` into `acc` for every host still present in `acc`'s scope;
/// a host absent from `delta` but requested to stay in scope is left
/// unchanged. Hosts outside the step's scope are untouched by definition
/// since `delta` never contains them (see `ScopeWrapper`).
pub fn merge_additive(acc: &mut ActivationMap, scope: &[HostName], delta: &ActivationMap) {
    for host in scope {
        match delta.get(host) {
            Some(value) => {
                *acc.entry(host.clone()).or_insert(0.0) += value;
            }
            None => {
                acc.remove(host);
            }
        }
    }
}

/// Min-max-normalizes `weights` to `[0, 1]`; if every value is equal,
/// every host gets `0.5` (§4.4 step 5).
pub fn normalize_min_max(weights: &HashMap<HostName, f64>) -> HashMap<HostName, f64> {
    if weights.is_empty() {
        return HashMap::new();
    }
    let min = weights.values().cloned().fold(f64::INFINITY, f64::min);
    let max = weights.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return weights.keys().cloned().map(|h| (h, 0.5)).collect();
    }
    weights
        .iter()
        .map(|(h, v)| (h.clone(), (v - min) / (max - min)))
        .collect()
}

/// Scales `value` from `[in_lo, in_hi]` into `[out_lo, out_hi]`, clamping
/// to the output bounds. Used by `ResourceBalancing` and the contention
/// weighers (§4.6).
pub fn scale(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    if (in_hi - in_lo).abs() < f64::EPSILON {
        return out_lo;
    }
    let t = ((value - in_lo) / (in_hi - in_lo)).clamp(0.0, 1.0);
    out_lo + t * (out_hi - out_lo)
}
