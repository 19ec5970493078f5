//! Step scoping (§4.5): a step config may restrict itself to a subset of
//! hosts via host selectors, or bypass itself entirely for a request via
//! spec selectors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::feature::capabilities::HostCapabilities;
use crate::model::HostName;

use super::request::Spec;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetOp {
    Union,
    Difference,
    Intersection,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum HostPredicate {
    TraitSubstring { substring: String },
    HypervisorType { hypervisor_type: String },
}

impl HostPredicate {
    fn matches(&self, caps: &HostCapabilities) -> bool {
        match self {
            HostPredicate::TraitSubstring { substring } => caps
                .trait_set()
                .iter()
                .any(|t| t.contains(substring.as_str())),
            HostPredicate::HypervisorType { hypervisor_type } => {
                caps.hypervisor_type.contains(hypervisor_type.as_str())
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostSelectorConfig {
    #[serde(flatten)]
    pub predicate: HostPredicate,
    pub operation: SetOp,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecAction {
    Skip,
    Continue,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum SpecPredicate {
    FlavorNameSubstring { substring: String },
    VmwareOrigin,
}

impl SpecPredicate {
    fn matches(&self, spec: &Spec) -> bool {
        match self {
            SpecPredicate::FlavorNameSubstring { substring } => {
                spec.flavor.name.as_str().contains(substring.as_str())
            }
            SpecPredicate::VmwareOrigin => spec.vmware,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpecSelectorConfig {
    #[serde(flatten)]
    pub predicate: SpecPredicate,
    pub action: SpecAction,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    #[serde(default)]
    pub hosts: Vec<HostSelectorConfig>,
    #[serde(default)]
    pub specs: Vec<SpecSelectorConfig>,
}

impl ScopeConfig {
    /// Evaluates the spec selectors; `true` means the step is bypassed
    /// entirely for this request (§4.5).
    pub fn should_skip(&self, spec: &Spec) -> bool {
        self.specs
            .iter()
            .any(|s| s.action == SpecAction::Skip && s.predicate.matches(spec))
    }

    /// Resolves the host selectors into a concrete scope, starting from
    /// the full candidate set and combining each selector in order with
    /// its declared set operation.
    pub fn resolve_hosts(
        &self,
        full: &[HostName],
        capabilities: &HashMap<HostName, HostCapabilities>,
    ) -> Vec<HostName> {
        let mut scope: Vec<HostName> = full.to_vec();
        for selector in &self.hosts {
            let matching: Vec<HostName> = full
                .iter()
                .filter(|h| {
                    capabilities
                        .get(*h)
                        .map(|c| selector.predicate.matches(c))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            scope = match selector.operation {
                SetOp::Union => {
                    let mut combined = scope;
                    for h in matching {
                        if !combined.contains(&h) {
                            combined.push(h);
                        }
                    }
                    combined
                }
                SetOp::Difference => scope.into_iter().filter(|h| !matching.contains(h)).collect(),
                SetOp::Intersection => scope.into_iter().filter(|h| matching.contains(h)).collect(),
            };
        }
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn caps(hypervisor_type: &str, traits: &[&str]) -> HostCapabilities {
        HostCapabilities {
            host_name: "h".into(),
            traits: serde_json::json!(traits),
            cpu_info: serde_json::json!({}),
            hypervisor_type: hypervisor_type.to_string(),
            disabled: false,
            agent_down: false,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn intersection_narrows_to_matching_hosts() {
        let full = vec![HostName::from("h1"), HostName::from("h2")];
        let mut capabilities = HashMap::new();
        capabilities.insert(HostName::from("h1"), caps("QEMU", &[]));
        capabilities.insert(HostName::from("h2"), caps("VMware", &[]));

        let config = ScopeConfig {
            hosts: vec![HostSelectorConfig {
                predicate: HostPredicate::HypervisorType {
                    hypervisor_type: "VMware".into(),
                },
                operation: SetOp::Intersection,
            }],
            specs: vec![],
        };

        assert_eq!(config.resolve_hosts(&full, &capabilities), vec![HostName::from("h2")]);
    }
}
