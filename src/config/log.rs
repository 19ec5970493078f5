//! Logging & tracing bootstrap, adapted from the teacher's
//! `config::log::Log`: a tracing-subscriber registry bridged to
//! OpenTelemetry, with the logger/meter/tracer providers built once and
//! stashed behind a `OnceLock`.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use displaydoc::Display;
use opentelemetry::global;
use opentelemetry::metrics::Meter;
use opentelemetry_otlp::WithExportConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

static INIT_LOG: OnceLock<Arc<Log>> = OnceLock::new();

#[derive(Debug, Display, Error)]
pub enum Error {
    /// failed to parse log directive: {0}
    Directive(#[from] tracing_subscriber::filter::ParseError),
    /// failed to install global tracer/meter provider
    GlobalInstall,
}

pub struct Log {
    pub meter: opentelemetry::sdk::metrics::SdkMeterProvider,
    pub filter: String,
}

impl Log {
    /// `otlp_endpoint` is `None` in local/dev runs, where metrics stay
    /// in-process and are only readable via the debug exporter.
    pub fn new(service_name: &str, filter: &str, otlp_endpoint: Option<&str>) -> Arc<Self> {
        INIT_LOG
            .get_or_init(|| {
                let resource = opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )]);

                let meter = match otlp_endpoint {
                    Some(endpoint) => opentelemetry_otlp::new_pipeline()
                        .metrics(opentelemetry::runtime::Tokio)
                        .with_exporter(
                            opentelemetry_otlp::new_exporter()
                                .tonic()
                                .with_endpoint(endpoint)
                                .with_timeout(Duration::from_secs(5)),
                        )
                        .with_resource(resource)
                        .build()
                        .expect("otlp metrics pipeline"),
                    None => opentelemetry::sdk::metrics::SdkMeterProvider::builder()
                        .with_resource(resource)
                        .build(),
                };

                Arc::new(Log {
                    meter,
                    filter: filter.to_string(),
                })
            })
            .clone()
    }

    pub fn init(&self) -> Result<(), Error> {
        global::set_meter_provider(self.meter.clone());

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.filter.clone()))
            .add_directive("h2=error".parse()?)
            .add_directive("hyper=error".parse()?)
            .add_directive("reqwest=error".parse()?);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
            .map_err(|_| Error::GlobalInstall)
    }

    pub fn meter(&self, component: &str) -> Meter {
        global::meter(component.to_string())
    }
}

pub fn default_filter() -> &'static str {
    DEFAULT_FILTER
}
