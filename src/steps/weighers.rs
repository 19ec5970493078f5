//! Weigher steps (§4.6): adjust activations, must not add or remove
//! hosts from their scope.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::model::feature::contention::Window;
use crate::pipeline::activation::{scale, ActivationMap};
use crate::pipeline::feature_source::FeatureSource;
use crate::pipeline::request::Request;
use crate::pipeline::step::{Error, Step, StepKind};

fn parse_opts<T: for<'de> Deserialize<'de> + Default>(opts: &Value) -> Result<T, Error> {
    if opts.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(opts.clone()).map_err(|e| Error::InvalidOptions(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ResourceBalancingOpts {
    resources: Vec<String>,
    lower_bound: f64,
    upper_bound: f64,
    post_placement: bool,
}

impl Default for ResourceBalancingOpts {
    fn default() -> Self {
        Self {
            resources: vec!["cpu".into(), "ram".into(), "disk".into()],
            lower_bound: 0.0,
            upper_bound: 1.0,
            post_placement: false,
        }
    }
}

/// Scales each enabled resource's utilization percentage into an
/// activation between the configured bounds and sums the contributions
/// (Scenario 2).
pub struct ResourceBalancing;

#[async_trait]
impl Step for ResourceBalancing {
    fn name(&self) -> &'static str {
        "resource_balancing"
    }

    fn kind(&self) -> StepKind {
        StepKind::Weigher
    }

    fn init(&self, opts: &Value) -> Result<(), Error> {
        let parsed: ResourceBalancingOpts = serde_json::from_value(opts.clone())
            .map_err(|e| Error::InvalidOptions(e.to_string()))?;
        if (parsed.upper_bound - parsed.lower_bound).abs() < f64::EPSILON {
            return Err(Error::InvalidOptions(
                "resource_balancing bounds must not be equal".into(),
            ));
        }
        Ok(())
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let opts: ResourceBalancingOpts = parse_opts(opts)?;

        let utilization = features
            .utilization_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        let mut out = ActivationMap::new();

        for (host, value) in scope {
            let Some(u) = utilization.get(host.as_str()) else {
                out.insert(host.clone(), *value);
                continue;
            };
            let mut contribution = 0.0;
            for resource in &opts.resources {
                let (used, total) = match resource.as_str() {
                    "cpu" => (u.vcpus_used, u.vcpus_total),
                    "ram" => (u.mem_used_mb, u.mem_total_mb),
                    "disk" => (u.disk_used_gb, u.disk_total_gb),
                    _ => continue,
                };
                let share = match resource.as_str() {
                    "cpu" => i64::from(request.spec.flavor.vcpus),
                    "ram" => i64::from(request.spec.flavor.memory_mb),
                    _ => 0,
                };
                let projected_used = if opts.post_placement { used + share } else { used };
                let percent = if total > 0 {
                    (projected_used as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                contribution += scale(percent, 0.0, 100.0, opts.upper_bound, opts.lower_bound);
            }
            out.insert(host.clone(), *value + contribution);
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct NoisyProjectsOpts {
    max_penalty: f64,
}

impl Default for NoisyProjectsOpts {
    fn default() -> Self {
        Self { max_penalty: 1.0 }
    }
}

/// Downvotes hosts already running the requesting project's workloads,
/// proportional to that project's average CPU usage on the host.
pub struct AntiAffinityNoisyProjects;

#[async_trait]
impl Step for AntiAffinityNoisyProjects {
    fn name(&self) -> &'static str {
        "anti_affinity_noisy_projects"
    }

    fn kind(&self) -> StepKind {
        StepKind::Weigher
    }

    fn init(&self, opts: &Value) -> Result<(), Error> {
        serde_json::from_value::<NoisyProjectsOpts>(opts.clone())
            .map(|_| ())
            .map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        request: &Request,
        opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let opts: NoisyProjectsOpts = parse_opts(opts)?;
        let noisy = features
            .noisy_projects_map()
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        let mut out = ActivationMap::new();

        for (host, value) in scope {
            let servers = features.servers_by_host(host.as_str()).await.map_err(|e| {
                Error::Feature(format!("failed to load servers for {host}: {e}"))
            })?;
            let hosts_project = servers
                .iter()
                .any(|s| s.project_id == request.spec.project_id.as_str());

            if !hosts_project {
                out.insert(host.clone(), *value);
                continue;
            }

            let avg_cpu = noisy
                .get(&(host.as_str().to_string(), request.spec.project_id.to_string()))
                .copied()
                .unwrap_or(0.0);
            let penalty = scale(avg_cpu, 0.0, 100.0, 0.0, opts.max_penalty);
            out.insert(host.clone(), *value - penalty);
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ContentionOpts {
    avg_threshold: f64,
    max_threshold: f64,
    penalty: f64,
}

impl Default for ContentionOpts {
    fn default() -> Self {
        Self {
            avg_threshold: 80.0,
            max_threshold: 95.0,
            penalty: 1.0,
        }
    }
}

/// Downvotes hosts whose average or maximum CPU contention in a named
/// window exceeds configured bounds; `long` and `short` variants differ
/// only in which window's feature table they read.
pub struct AvoidContendedHosts {
    step_name: &'static str,
    window: Window,
}

impl AvoidContendedHosts {
    pub fn new(step_name: &'static str, window: Window) -> Self {
        Self { step_name, window }
    }
}

#[async_trait]
impl Step for AvoidContendedHosts {
    fn name(&self) -> &'static str {
        self.step_name
    }

    fn kind(&self) -> StepKind {
        StepKind::Weigher
    }

    fn init(&self, opts: &Value) -> Result<(), Error> {
        serde_json::from_value::<ContentionOpts>(opts.clone())
            .map(|_| ())
            .map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    async fn run(
        &self,
        features: &mut dyn FeatureSource,
        scope: &ActivationMap,
        _request: &Request,
        opts: &Value,
    ) -> Result<ActivationMap, Error> {
        let opts: ContentionOpts = parse_opts(opts)?;
        let contention = features
            .contention_map(self.window)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        let mut out = ActivationMap::new();

        for (host, value) in scope {
            let penalty = match contention.get(host.as_str()) {
                Some(c) if c.avg_contention > opts.avg_threshold || c.max_contention > opts.max_threshold => {
                    opts.penalty
                }
                _ => 0.0,
            };
            out.insert(host.clone(), *value - penalty);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::model::feature::utilization::HostUtilization;
    use crate::model::server::Server;
    use crate::model::{FlavorName, HostName, ProjectId};
    use crate::pipeline::feature_source::FakeFeatureSource;
    use crate::pipeline::request::{FlavorSpec, RequestContext, Spec};

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

    fn scope_of(hosts: &[(&str, f64)]) -> ActivationMap {
        hosts.iter().map(|(h, v)| (HostName::from(*h), *v)).collect()
    }

    fn utilization(host: &str, vcpus_total: i64, vcpus_used: i64) -> HostUtilization {
        HostUtilization {
            host_name: host.to_string(),
            vcpus_total,
            vcpus_used,
            vcpu_percent: vcpus_used as f64 / vcpus_total as f64 * 100.0,
            mem_total_mb: 1,
            mem_used_mb: 0,
            mem_percent: 0.0,
            disk_total_gb: 1,
            disk_used_gb: 0,
            disk_percent: 0.0,
            computed_at: Utc::now(),
        }
    }

    /// Scenario 2 (§8): a fully-idle host gains the maximum contribution
    /// per enabled resource, a fully-loaded host gains none, and a host
    /// absent from the utilization table gains nothing either.
    #[tokio::test]
    async fn resource_balancing_scales_idle_and_loaded_hosts_apart() {
        let mut features = FakeFeatureSource::new().with_utilization(
            [
                ("host1".to_string(), utilization("host1", 100, 0)),
                ("host2".to_string(), utilization("host2", 100, 100)),
            ]
            .into_iter()
            .collect(),
        );
        let scope = scope_of(&[("host1", 0.0), ("host2", 0.0), ("host3", 0.0)]);
        let request = base_request(&["host1", "host2", "host3"]);
        let opts = serde_json::json!({"resources": ["cpu"], "lower_bound": 0.0, "upper_bound": 1.0});

        let out = ResourceBalancing.run(&mut features, &scope, &request, &opts).await.unwrap();
        assert_eq!(out[&HostName::from("host1")], 1.0);
        assert_eq!(out[&HostName::from("host2")], 0.0);
        assert_eq!(out[&HostName::from("host3")], 0.0, "no utilization data ⇒ no contribution");
    }

    #[tokio::test]
    async fn noisy_projects_penalizes_hosts_running_the_requesting_project() {
        let mut features = FakeFeatureSource::new()
            .with_noisy_projects([(("host1".to_string(), "proj-a".to_string()), 50.0)].into_iter().collect())
            .with_servers(
                "host1",
                vec![Server {
                    id: Uuid::new_v4(),
                    host_name: Some("host1".to_string()),
                    project_id: "proj-a".to_string(),
                    user_id: "user-a".to_string(),
                    flavor_name: "m1.small".to_string(),
                    vcpus: 2,
                    memory_mb: 2048,
                    disk_gb: 20,
                    status: "ACTIVE".to_string(),
                    created: Utc::now(),
                    deleted: false,
                    synced_at: Utc::now(),
                }],
            )
            .with_servers("host2", vec![]);
        let scope = scope_of(&[("host1", 0.0), ("host2", 0.0)]);
        let request = base_request(&["host1", "host2"]);
        let opts = serde_json::json!({"max_penalty": 1.0});

        let out = AntiAffinityNoisyProjects.run(&mut features, &scope, &request, &opts).await.unwrap();
        assert_eq!(out[&HostName::from("host1")], -0.5);
        assert_eq!(out[&HostName::from("host2")], 0.0, "no servers from the requesting project ⇒ no penalty");
    }

    #[tokio::test]
    async fn avoid_contended_hosts_penalizes_only_over_threshold() {
        let mut features = FakeFeatureSource::new().with_contention(
            Window::Long,
            [(
                "host1".to_string(),
                crate::model::feature::contention::HostContention {
                    host_name: "host1".to_string(),
                    window: "long".to_string(),
                    avg_contention: 90.0,
                    max_contention: 99.0,
                    computed_at: Utc::now(),
                },
            )]
            .into_iter()
            .collect(),
        );
        let scope = scope_of(&[("host1", 0.0), ("host2", 0.0)]);
        let request = base_request(&["host1", "host2"]);
        let step = AvoidContendedHosts::new("avoid_contended_hosts_long", Window::Long);
        let opts = serde_json::json!({"avg_threshold": 80.0, "max_threshold": 95.0, "penalty": 1.0});

        let out = step.run(&mut features, &scope, &request, &opts).await.unwrap();
        assert_eq!(out[&HostName::from("host1")], -1.0);
        assert_eq!(out[&HostName::from("host2")], 0.0);
    }
}
