//! `feature_az`: derives each host's availability zone from its
//! aggregate memberships, falling back to `NULL` when a host belongs to
//! no az-tagged aggregate.

use async_trait::async_trait;
use chrono::Utc;
use diesel::sql_types::{Nullable, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::db::Conn;
use crate::model::feature::az::HostAz;

use super::Error;

const SQL: &str = "
    SELECT h.host_name AS host_name, a.az_name AS az_name
    FROM openstack_hypervisors h
    LEFT JOIN (
        SELECT DISTINCT ON (host_name) host_name, az_name
        FROM openstack_aggregates
        WHERE az_name IS NOT NULL
        ORDER BY host_name, az_name
    ) a ON a.host_name = h.host_name
";

#[derive(QueryableByName)]
struct Row {
    #[diesel(sql_type = Text)]
    host_name: String,
    #[diesel(sql_type = Nullable<Text>)]
    az_name: Option<String>,
}

pub struct AzExtractor;

#[async_trait]
impl super::Extractor for AzExtractor {
    fn name(&self) -> &'static str {
        "feature_az"
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["compute", "nova_aggregates"]
    }

    fn validate_options(&self, options: &Value) -> Result<(), Error> {
        if !options.is_null() && options.as_object().map(|o| o.is_empty()).unwrap_or(false) {
            return Ok(());
        }
        if !options.is_null() {
            return Err(Error::InvalidOptions("feature_az takes no options".into()));
        }
        Ok(())
    }

    async fn run(&self, conn: &mut Conn<'_>, _options: &Value) -> Result<usize, Error> {
        let rows: Vec<Row> = diesel::sql_query(SQL).load(conn).await?;
        let now = Utc::now();
        let out: Vec<HostAz> = rows
            .into_iter()
            .map(|r| HostAz {
                host_name: r.host_name,
                az_name: r.az_name,
                computed_at: now,
            })
            .collect();
        let count = out.len();
        HostAz::replace_all(out, conn)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        Ok(count)
    }
}
