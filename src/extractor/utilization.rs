//! `feature_utilization`: per-host usage percentages computed directly
//! from the hypervisor totals the compute datasource last synced.

use async_trait::async_trait;
use chrono::Utc;
use diesel::sql_types::{BigInt, Double, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::db::Conn;
use crate::model::feature::utilization::HostUtilization;

use super::Error;

const SQL: &str = "
    SELECT
        host_name,
        vcpus AS vcpus_total,
        vcpus_used,
        CASE WHEN vcpus = 0 THEN 0.0 ELSE (vcpus_used::float8 / vcpus::float8) * 100.0 END AS vcpu_percent,
        memory_mb AS mem_total_mb,
        memory_mb_used AS mem_used_mb,
        CASE WHEN memory_mb = 0 THEN 0.0 ELSE (memory_mb_used::float8 / memory_mb::float8) * 100.0 END AS mem_percent,
        local_gb AS disk_total_gb,
        local_gb_used AS disk_used_gb,
        CASE WHEN local_gb = 0 THEN 0.0 ELSE (local_gb_used::float8 / local_gb::float8) * 100.0 END AS disk_percent
    FROM openstack_hypervisors
";

#[derive(QueryableByName)]
struct Row {
    #[diesel(sql_type = Text)]
    host_name: String,
    #[diesel(sql_type = BigInt)]
    vcpus_total: i64,
    #[diesel(sql_type = BigInt)]
    vcpus_used: i64,
    #[diesel(sql_type = Double)]
    vcpu_percent: f64,
    #[diesel(sql_type = BigInt)]
    mem_total_mb: i64,
    #[diesel(sql_type = BigInt)]
    mem_used_mb: i64,
    #[diesel(sql_type = Double)]
    mem_percent: f64,
    #[diesel(sql_type = BigInt)]
    disk_total_gb: i64,
    #[diesel(sql_type = BigInt)]
    disk_used_gb: i64,
    #[diesel(sql_type = Double)]
    disk_percent: f64,
}

pub struct UtilizationExtractor;

#[async_trait]
impl super::Extractor for UtilizationExtractor {
    fn name(&self) -> &'static str {
        "feature_utilization"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["compute"]
    }

    fn validate_options(&self, options: &Value) -> Result<(), Error> {
        if !options.is_null() {
            return Err(Error::InvalidOptions(
                "feature_utilization takes no options".into(),
            ));
        }
        Ok(())
    }

    async fn run(&self, conn: &mut Conn<'_>, _options: &Value) -> Result<usize, Error> {
        let rows: Vec<Row> = diesel::sql_query(SQL).load(conn).await?;
        let now = Utc::now();
        let out: Vec<HostUtilization> = rows
            .into_iter()
            .map(|r| HostUtilization {
                host_name: r.host_name,
                vcpus_total: r.vcpus_total,
                vcpus_used: r.vcpus_used,
                vcpu_percent: r.vcpu_percent,
                mem_total_mb: r.mem_total_mb,
                mem_used_mb: r.mem_used_mb,
                mem_percent: r.mem_percent,
                disk_total_gb: r.disk_total_gb,
                disk_used_gb: r.disk_used_gb,
                disk_percent: r.disk_percent,
                computed_at: now,
            })
            .collect();
        let count = out.len();
        HostUtilization::replace_all(out, conn)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        Ok(count)
    }
}
