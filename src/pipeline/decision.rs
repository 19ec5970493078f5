//! The decision result of §3/§6: the egress shape plus the record
//! persisted to `decisions`, immutable once written.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Conn;
use crate::model::{HostName, NewDecision};

use super::activation::ActivationMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticLabel {
    pub unit: String,
    pub subjects: HashMap<HostName, f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    pub ordered_hosts: Vec<HostName>,
    pub target_host: Option<HostName>,
    pub raw_in_weights: HashMap<HostName, f64>,
    pub normalized_in_weights: HashMap<HostName, f64>,
    pub aggregated_out_weights: ActivationMap,
    pub statistics: HashMap<String, StatisticLabel>,
}

impl DecisionResult {
    /// Invariant 7 (§8): the target is null iff the ordered list is
    /// empty.
    pub fn new(
        ordered_hosts: Vec<HostName>,
        raw_in_weights: HashMap<HostName, f64>,
        normalized_in_weights: HashMap<HostName, f64>,
        aggregated_out_weights: ActivationMap,
        statistics: HashMap<String, StatisticLabel>,
    ) -> Self {
        let target_host = ordered_hosts.first().cloned();
        Self {
            ordered_hosts,
            target_host,
            raw_in_weights,
            normalized_in_weights,
            aggregated_out_weights,
            statistics,
        }
    }

    pub async fn persist(
        &self,
        request_id: &str,
        pipeline_name: &str,
        status: &str,
        conn: &mut Conn<'_>,
    ) -> Result<(), crate::model::decision::Error> {
        let record = NewDecision {
            id: Uuid::new_v4(),
            request_id: request_id.to_string(),
            pipeline_name: pipeline_name.to_string(),
            target_host: self.target_host.as_ref().map(|h| h.as_str().to_string()),
            ordered_hosts: serde_json::to_value(&self.ordered_hosts).unwrap_or_default(),
            raw_in_weights: serde_json::to_value(&self.raw_in_weights).unwrap_or_default(),
            normalized_in_weights: serde_json::to_value(&self.normalized_in_weights)
                .unwrap_or_default(),
            aggregated_out_weights: serde_json::to_value(&self.aggregated_out_weights)
                .unwrap_or_default(),
            statistics: serde_json::to_value(&self.statistics).unwrap_or_default(),
            status: status.to_string(),
            created_at: Utc::now(),
        };
        record.persist(conn).await
    }
}
