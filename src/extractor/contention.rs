//! `feature_contention`: per-host average/maximum CPU contention over
//! the retained window of a single tracked Prometheus metric, read by
//! both `AvoidContendedHosts` variants (§4.6). `long` and `short` are
//! two instances of this extractor differing only in which metric name
//! they aggregate.

use async_trait::async_trait;
use chrono::Utc;
use diesel::sql_types::{Double, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::db::Conn;
use crate::model::feature::contention::{HostContention, Window};

use super::Error;

const SQL: &str = "
    SELECT host_name, AVG(value) AS avg_contention, MAX(value) AS max_contention
    FROM metric_samples
    WHERE metric_name = $1
    GROUP BY host_name
";

#[derive(QueryableByName)]
struct Row {
    #[diesel(sql_type = Text)]
    host_name: String,
    #[diesel(sql_type = Double)]
    avg_contention: f64,
    #[diesel(sql_type = Double)]
    max_contention: f64,
}

pub struct ContentionExtractor {
    extractor_name: &'static str,
    window: Window,
    metric_name: &'static str,
}

impl ContentionExtractor {
    pub fn new(extractor_name: &'static str, window: Window) -> Self {
        let metric_name = match window {
            Window::Long => "host_cpu_contention_long",
            Window::Short => "host_cpu_contention_short",
        };
        Self {
            extractor_name,
            window,
            metric_name,
        }
    }
}

#[async_trait]
impl super::Extractor for ContentionExtractor {
    fn name(&self) -> &'static str {
        self.extractor_name
    }

    fn triggers(&self) -> &'static [&'static str] {
        &["metrics_ts"]
    }

    fn validate_options(&self, options: &Value) -> Result<(), Error> {
        if !options.is_null() {
            return Err(Error::InvalidOptions(format!(
                "{} takes no options",
                self.extractor_name
            )));
        }
        Ok(())
    }

    async fn run(&self, conn: &mut Conn<'_>, _options: &Value) -> Result<usize, Error> {
        let rows: Vec<Row> = diesel::sql_query(SQL)
            .bind::<Text, _>(self.metric_name)
            .load(conn)
            .await?;
        let now = Utc::now();
        let out: Vec<HostContention> = rows
            .into_iter()
            .map(|r| HostContention {
                host_name: r.host_name,
                window: self.window.as_str().to_string(),
                avg_contention: r.avg_contention,
                max_contention: r.max_contention,
                computed_at: now,
            })
            .collect();
        let count = out.len();
        HostContention::replace_all(self.window, out, conn)
            .await
            .map_err(|e| Error::Feature(e.to_string()))?;
        Ok(count)
    }
}
