//! The ingress shape of §6: one placement request carries the caller's
//! candidate list, its pre-computed raw weights, and a typed spec.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{FlavorName, HostName, ProjectId};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlavorSpec {
    pub name: FlavorName,
    pub vcpus: i32,
    pub memory_mb: i32,
    pub root_gb: i32,
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub flavor: FlavorSpec,
    #[serde(default)]
    pub availability_zone: Option<String>,
    pub project_id: ProjectId,
    pub user_id: String,
    #[serde(default = "default_num_instances")]
    pub num_instances: u32,
    #[serde(default)]
    pub ignore_hosts: Vec<HostName>,
    #[serde(default)]
    pub force_hosts: Vec<HostName>,
    #[serde(default)]
    pub scheduler_hints: serde_json::Value,
    /// Whether the request originates from a VMware-backed compute driver
    /// rather than being derived from candidate capabilities (spec §9 open
    /// question — resolved in DESIGN.md: kept as a caller-supplied flag).
    #[serde(default)]
    pub vmware: bool,
}

fn default_num_instances() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: String,
    #[serde(default)]
    pub global_request_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Request {
    pub hosts: Vec<HostName>,
    pub weights: HashMap<HostName, f64>,
    pub spec: Spec,
    #[serde(default)]
    pub pipeline: Option<String>,
    pub context: RequestContext,
}
