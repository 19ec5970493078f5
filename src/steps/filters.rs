//! Filter steps (§4.6): may remove hosts from the scoped activation map,
//! never add to it positively.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::model::reservation::Reservation;
use crate::pipeline::activation::ActivationMap;
use crate::pipeline::feature_source::FeatureSource;
use crate::pipeline::request::Request;
use crate::pipeline::step::{Error, Step, StepKind};

const DISABLED_TRAIT: &str = "COMPUTE_STATUS_DISABLED";
const EXTERNAL_CUSTOMER_TRAIT: &str = "external-customer-supported";

fn flatten_json(value: &Value, prefix: &str, out: &mut std::collections::HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let next_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_json(v, &next_prefix, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Removes any host whose AZ doesn't match the request's requested AZ;
/// hosts with no AZ assigned are removed when an AZ is requested
/// (Scenario 1).
pub struct FilterCorrectAZ;

#[async_trait]
impl Step for FilterCorrectAZ {
    fn name(&self) -> &'static str {
        "filter_correct_az"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, _opts: &Value) -> Result<(), Error> {
        Ok(())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        _opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let Some(requested_az) = &request.spec.availability_zone else {
            return Ok(scope.clone());
        };
        let az_map = features
            .az_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        if az_map.is_empty() {
            return Ok(scope.clone());
        }
        Ok(scope
            .iter()
            .filter(|(host, _)| az_map.get(host.as_str()).map(|az| az.as_deref()) == Some(Some(requested_az.as_str())))
            .map(|(h, v)| (h.clone(), *v))
            .collect())
    }
}

/// Removes hosts whose compute service is disabled, whose agent is
/// down, or that carry the disabled-status trait.
pub struct FilterDisabled;

#[async_trait]
impl Step for FilterDisabled {
    fn name(&self) -> &'static str {
        "filter_disabled"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, _opts: &Value) -> Result<(), Error> {
        Ok(())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        _request: &Request,
        _opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let capabilities = features
            .capabilities_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        if capabilities.is_empty() {
            return Ok(scope.clone());
        }
        Ok(scope
            .iter()
            .filter(|(host, _)| {
                capabilities
                    .get(host.as_str())
                    .map(|c| {
                        !c.disabled
                            && !c.agent_down
                            && !c.trait_set().iter().any(|t| t == DISABLED_TRAIT)
                    })
                    .unwrap_or(false)
            })
            .map(|(h, v)| (h.clone(), *v))
            .collect())
    }
}

/// Parses `trait:X = required|forbidden` extra-specs; requires all
/// required traits present and all forbidden traits absent (Scenario 4).
pub struct FilterHasRequestedTraits;

#[async_trait]
impl Step for FilterHasRequestedTraits {
    fn name(&self) -> &'static str {
        "filter_has_requested_traits"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, _opts: &Value) -> Result<(), Error> {
        Ok(())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        _opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let mut required = Vec::new();
        let mut forbidden = Vec::new();
        for (key, value) in &request.spec.flavor.extra_specs {
            let Some(trait_name) = key.strip_prefix("trait:") else {
                continue;
            };
            match value.as_str() {
                "required" => required.push(trait_name.to_string()),
                "forbidden" => forbidden.push(trait_name.to_string()),
                _ => {}
            }
        }
        if required.is_empty() && forbidden.is_empty() {
            return Ok(scope.clone());
        }

        let capabilities = features
            .capabilities_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        if capabilities.is_empty() {
            return Ok(scope.clone());
        }

        Ok(scope
            .iter()
            .filter(|(host, _)| {
                let Some(caps) = capabilities.get(host.as_str()) else {
                    return false;
                };
                let traits = caps.trait_set();
                required.iter().all(|t| traits.contains(t))
                    && forbidden.iter().all(|t| !traits.contains(t))
            })
            .map(|(h, v)| (h.clone(), *v))
            .collect())
    }
}

/// Effective allocatable = advertised − used − sum of active
/// reservations' requested capacity, with the matching (project,
/// flavor) reservation's share unlocked (Scenario 3).
pub struct FilterHasEnoughCapacity;

#[async_trait]
impl Step for FilterHasEnoughCapacity {
    fn name(&self) -> &'static str {
        "filter_has_enough_capacity"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, _opts: &Value) -> Result<(), Error> {
        Ok(())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        _opts: &Value,
    ) -> Result<ActivationMap, Error> {
        if request.spec.flavor.vcpus == 0 || request.spec.flavor.memory_mb == 0 {
            return Err(Error::ZeroDivision(request.spec.flavor.name.to_string()));
        }

        let utilization = features
            .utilization_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        if utilization.is_empty() {
            return Ok(scope.clone());
        }
        let mut out = ActivationMap::new();
        for (host, value) in scope {
            let Some(u) = utilization.get(host.as_str()) else {
                continue;
            };
            let active = features
                .active_reservations(host.as_str())
                .await
                .map_err(|e| Error::Feature(e.to_string()))?;
            let locked_vcpus = Reservation::locked_vcpus(
                &active,
                request.spec.project_id.as_str(),
                request.spec.flavor.name.as_str(),
            );
            let locked_memory = Reservation::locked_memory_mb(
                &active,
                request.spec.project_id.as_str(),
                request.spec.flavor.name.as_str(),
            );

            let effective_vcpus = u.vcpus_total - u.vcpus_used - locked_vcpus;
            let effective_memory = u.mem_total_mb - u.mem_used_mb - locked_memory;
            let vcpu_slots = effective_vcpus / i64::from(request.spec.flavor.vcpus);
            let memory_slots = effective_memory / i64::from(request.spec.flavor.memory_mb);
            let required = i64::from(request.spec.num_instances);

            if vcpu_slots >= required && memory_slots >= required {
                out.insert(host.clone(), *value);
            }
        }
        Ok(out)
    }
}

/// Matches `capabilities:X[.Y] = V` extra-specs against the host's
/// flattened CPU-info JSON and hypervisor type.
pub struct FilterComputeCapabilities;

#[async_trait]
impl Step for FilterComputeCapabilities {
    fn name(&self) -> &'static str {
        "filter_compute_capabilities"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, _opts: &Value) -> Result<(), Error> {
        Ok(())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        _opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let capabilities = features
            .capabilities_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        let requirements: Vec<(String, String)> = request
            .spec
            .flavor
            .extra_specs
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("capabilities:")
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();

        if requirements.is_empty() || capabilities.is_empty() {
            return Ok(scope.clone());
        }

        Ok(scope
            .iter()
            .filter(|(host, _)| {
                let Some(caps) = capabilities.get(host.as_str()) else {
                    return false;
                };
                let mut flat = std::collections::HashMap::new();
                flatten_json(&caps.cpu_info, "", &mut flat);
                flat.insert("hypervisor_type".to_string(), caps.hypervisor_type.clone());

                requirements
                    .iter()
                    .all(|(key, expected)| flat.get(key).map(|v| v == expected).unwrap_or(false))
            })
            .map(|(h, v)| (h.clone(), *v))
            .collect())
    }
}

/// Honors `spec.ignore_hosts` (subtract) and `spec.force_hosts` (keep
/// only the intersection) — Scenario 6.
pub struct FilterHostInstructions;

#[async_trait]
impl Step for FilterHostInstructions {
    fn name(&self) -> &'static str {
        "filter_host_instructions"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, _opts: &Value) -> Result<(), Error> {
        Ok(())
    }

    async fn run(
        &self,
        _features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        _opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let mut out: ActivationMap = scope
            .iter()
            .filter(|(host, _)| !request.spec.ignore_hosts.contains(host))
            .map(|(h, v)| (h.clone(), *v))
            .collect();

        if !request.spec.force_hosts.is_empty() {
            out.retain(|host, _| request.spec.force_hosts.contains(host));
        }

        Ok(out)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct FilterExternalCustomerOpts {
    customer_prefixes: Vec<String>,
    ignore_domains: Vec<String>,
}

fn parse_external_customer_opts(opts: &Value) -> Result<FilterExternalCustomerOpts, Error> {
    if opts.is_null() {
        return Ok(FilterExternalCustomerOpts::default());
    }
    serde_json::from_value(opts.clone()).map_err(|e| Error::InvalidOptions(e.to_string()))
}

/// If the request's domain has an operator-configured customer prefix
/// and is not explicitly excluded, removes hosts carrying the
/// external-customer trait. `customer_prefixes`/`ignore_domains` are
/// configured options (§4.6), not caller-supplied request hints — only
/// the domain name itself comes from the request.
pub struct FilterExternalCustomer;

#[async_trait]
impl Step for FilterExternalCustomer {
    fn name(&self) -> &'static str {
        "filter_external_customer"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn init(&self, opts: &Value) -> Result<(), Error> {
        parse_external_customer_opts(opts).map(|_| ())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let Some(domain) = request
            .spec
            .scheduler_hints
            .get("domain_name")
            .and_then(Value::as_str)
        else {
            return Ok(scope.clone());
        };

        let opts = parse_external_customer_opts(opts)?;

        let applies = opts
            .customer_prefixes
            .iter()
            .any(|p| domain.starts_with(p.as_str()))
            && !opts.ignore_domains.iter().any(|d| d == domain);
        if !applies {
            return Ok(scope.clone());
        }

        let capabilities = features
            .capabilities_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        Ok(scope
            .iter()
            .filter(|(host, _)| {
                capabilities
                    .get(host.as_str())
                    .map(|c| !c.trait_set().iter().any(|t| t == EXTERNAL_CUSTOMER_TRAIT))
                    .unwrap_or(true)
            })
            .map(|(h, v)| (h.clone(), *v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::model::feature::capabilities::HostCapabilities;
    use crate::model::{FlavorName, HostName, ProjectId};
    use crate::pipeline::feature_source::FakeFeatureSource;
    use crate::pipeline::request::{FlavorSpec, RequestContext, Spec};

    fn capability(host: &str, disabled: bool, traits: &[&str]) -> HostCapabilities {
        HostCapabilities {
            host_name: host.to_string(),
            traits: serde_json::json!(traits),
            cpu_info: serde_json::json!({}),
            hypervisor_type: "QEMU".into(),
            disabled,
            agent_down: false,
            computed_at: Utc::now(),
        }
    }

    fn base_request(hosts: &[&str]) -> Request {
        let hosts: Vec<HostName> = hosts.iter().map(|h| HostName::from(*h)).collect();
        let weights = hosts.iter().cloned().map(|h| (h, 1.0)).collect();
        Request {
            hosts,
            weights,
            spec: Spec {
                flavor: FlavorSpec {
                    name: FlavorName("m1.small".to_string()),
                    vcpus: 2,
                    memory_mb: 2048,
                    root_gb: 20,
                    extra_specs: HashMap::new(),
                },
                availability_zone: None,
                project_id: ProjectId("proj-a".to_string()),
                user_id: "user-a".into(),
                num_instances: 1,
                ignore_hosts: vec![],
                force_hosts: vec![],
                scheduler_hints: Value::Null,
                vmware: false,
            },
            pipeline: None,
            context: RequestContext {
                request_id: "req-1".into(),
                global_request_id: None,
            },
        }
    }

    fn scope_of(hosts: &[&str]) -> ActivationMap {
        hosts.iter().map(|h| (HostName::from(*h), 0.0)).collect()
    }

    #[tokio::test]
    async fn disabled_host_is_removed() {
        let mut features = FakeFeatureSource::new().with_capabilities(
            [
                ("host-a".to_string(), capability("host-a", false, &[])),
                ("host-b".to_string(), capability("host-b", true, &[])),
            ]
            .into_iter()
            .collect(),
        );
        let scope = scope_of(&["host-a", "host-b"]);
        let request = base_request(&["host-a", "host-b"]);

        let out = FilterDisabled
            .run(&mut features, &scope, &request, &Value::Null)
            .await
            .unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec![&HostName::from("host-a")]);
    }

    #[tokio::test]
    async fn compute_capabilities_matches_flattened_cpu_info() {
        let mut capability = capability("host-a", false, &[]);
        capability.cpu_info = serde_json::json!({"vendor": "intel"});
        let mut features =
            FakeFeatureSource::new().with_capabilities([("host-a".to_string(), capability)].into_iter().collect());
        let scope = scope_of(&["host-a"]);
        let mut request = base_request(&["host-a"]);
        request
            .spec
            .flavor
            .extra_specs
            .insert("capabilities:vendor".to_string(), "intel".to_string());

        let out = FilterComputeCapabilities
            .run(&mut features, &scope, &request, &Value::Null)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);

        request.spec.flavor.extra_specs.insert("capabilities:vendor".to_string(), "amd".to_string());
        let out = FilterComputeCapabilities
            .run(&mut features, &scope, &request, &Value::Null)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    /// A caller cannot smuggle `customer_prefixes`/`ignore_domains` in via
    /// `scheduler_hints` — only the operator-configured `opts` govern the
    /// rule (§4.6).
    #[tokio::test]
    async fn external_customer_prefixes_come_from_opts_not_request_hints() {
        let mut features = FakeFeatureSource::new().with_capabilities(
            [("host-a".to_string(), capability("host-a", false, &[EXTERNAL_CUSTOMER_TRAIT]))]
                .into_iter()
                .collect(),
        );
        let scope = scope_of(&["host-a"]);
        let mut request = base_request(&["host-a"]);
        request.spec.scheduler_hints = serde_json::json!({
            "domain_name": "acme-corp",
            "customer_prefixes": ["acme"],
        });

        // No opts configured: the caller's own hinted prefix must not apply.
        let out = FilterExternalCustomer
            .run(&mut features, &scope, &request, &Value::Null)
            .await
            .unwrap();
        assert_eq!(out.len(), 1, "host-a must survive: opts carry no matching prefix");

        // Operator-configured opts do apply.
        let opts = serde_json::json!({"customer_prefixes": ["acme"], "ignore_domains": []});
        let out = FilterExternalCustomer
            .run(&mut features, &scope, &request, &opts)
            .await
            .unwrap();
        assert!(out.is_empty(), "host-a carries the external-customer trait and must be removed");
    }
}
