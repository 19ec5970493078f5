//! `feature_capabilities`: joins each host's hypervisor row with its
//! resource-provider traits, producing the flattened view
//! `FilterDisabled`, `FilterHasRequestedTraits`, and
//! `FilterComputeCapabilities` read (§4.6).

use async_trait::async_trait;
use chrono::Utc;
use diesel::sql_types::{Bool, Jsonb, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::db::Conn;
use crate::model::feature::capabilities::HostCapabilities;

use super::Error;

const SQL: &str = "
    SELECT
        h.host_name AS host_name,
        COALESCE(t.traits, '[]'::jsonb) AS traits,
        h.cpu_info AS cpu_info,
        h.hypervisor_type AS hypervisor_type,
        (h.status <> 'enabled') AS disabled,
        (h.state <> 'up') AS agent_down
    FROM openstack_hypervisors h
    LEFT JOIN (
        SELECT rp.host_name AS host_name, jsonb_agg(prt.trait_name) AS traits
        FROM openstack_resource_providers rp
        JOIN openstack_resource_provider_traits prt
            ON prt.resource_provider_id = rp.id
        WHERE rp.host_name IS NOT NULL
        GROUP BY rp.host_name
    ) t ON t.host_name = h.host_name
";

#[derive(QueryableByName)]
struct Row {
    #[diesel(sql_type = Text)]
    host_name: String,
    #[diesel(sql_type = Jsonb)]
    traits: Value,
    #[diesel(sql_type = Jsonb)]
    cpu_info: Value,
    #[diesel(sql_type = Text)]
    hypervisor_type: String,
    #[diesel(sql_type = Bool)]
    disabled: bool,
    #[diesel(sql_type = Bool)]
    agent_down: bool,
}

pub struct CapabilitiesExtractor;

#[async_trait]
impl super::Extractor for CapabilitiesExtractor {
    fn name(&self) -> &'static str {
        "feature_capabilities"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["compute", "placement"]
    }

    fn validate_options(&self, options: &Value) -> Result<(), Error> {
        if !options.is_null() {
            return Err(Error::InvalidOptions(
                "feature_capabilities takes no options".into(),
            ));
        }
        Ok(())
    }

    async fn run(&self, conn: &mut Conn<'_>, _options: &Value) -> Result<usize, Error> {
        let rows: Vec<Row> = diesel::sql_query(SQL).load(conn).await?;
        let now = Utc::now();
        let out: Vec<HostCapabilities> = rows
            .into_iter()
            .map(|r| HostCapabilities {
                host_name: r.host_name,
                traits: r.traits,
                cpu_info: r.cpu_info,
                hypervisor_type: r.hypervisor_type,
                disabled: r.disabled,
                agent_down: r.agent_down,
                computed_at: now,
            })
            .collect();
        let count = out.len();
        HostCapabilities::replace_all(out, conn)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        Ok(count)
    }
}
