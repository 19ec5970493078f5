//! `feature_noisy_projects`: a project's share of a host's vcpu usage,
//! approximating how much of that host's contention a single tenant
//! accounts for (§4.6, `AntiAffinityNoisyProjects`).

use async_trait::async_trait;
use chrono::Utc;
use diesel::sql_types::{Double, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::db::Conn;
use crate::model::feature::noisy_projects::NoisyProject;

use super::Error;

const SQL: &str = "
    SELECT
        s.host_name AS host_name,
        s.project_id AS project_id,
        COALESCE((SUM(s.vcpus)::float8 / NULLIF(h.vcpus, 0)::float8) * 100.0, 0.0) AS avg_cpu_percent
    FROM openstack_servers s
    JOIN openstack_hypervisors h ON h.host_name = s.host_name
    WHERE s.deleted = false AND s.host_name IS NOT NULL
    GROUP BY s.host_name, s.project_id, h.vcpus
";

#[derive(QueryableByName)]
struct Row {
    #[diesel(sql_type = Text)]
    host_name: String,
    #[diesel(sql_type = Text)]
    project_id: String,
    #[diesel(sql_type = Double)]
    avg_cpu_percent: f64,
}

pub struct NoisyProjectsExtractor;

#[async_trait]
impl super::Extractor for NoisyProjectsExtractor {
    fn name(&self) -> &'static str {
        "feature_noisy_projects"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["compute"]
    }

    fn validate_options(&self, options: &Value) -> Result<(), Error> {
        if !options.is_null() {
            return Err(Error::InvalidOptions(
                "feature_noisy_projects takes no options".into(),
            ));
        }
        Ok(())
    }

    async fn run(&self, conn: &mut Conn<'_>, _options: &Value) -> Result<usize, Error> {
        let rows: Vec<Row> = diesel::sql_query(SQL).load(conn).await?;
        let now = Utc::now();
        let out: Vec<NoisyProject> = rows
            .into_iter()
            .map(|r| NoisyProject {
                host_name: r.host_name,
                project_id: r.project_id,
                avg_cpu_percent: r.avg_cpu_percent,
                computed_at: now,
            })
            .collect();
        let count = out.len();
        NoisyProject::replace_all(out, conn)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        Ok(count)
    }
}
