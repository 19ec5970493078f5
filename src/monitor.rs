//! The passive collector of §2/§6: counters, histograms, and gauges
//! labeled by component name. Built on the same `opentelemetry::metrics`
//! API the teacher's `config::log::Log` already wires a meter provider
//! for, rather than reaching for a new metrics crate.

use opentelemetry::metrics::{Counter, Histogram, Meter, ObservableGauge};
use opentelemetry::KeyValue;

/// Shared handle to the engine's metric instruments. Cheap to clone; every
/// datasource adapter, extractor, and pipeline step wrapper holds one.
#[derive(Clone)]
pub struct Monitor {
    pipeline_run_duration: Histogram<f64>,
    step_run_duration: Histogram<f64>,
    extractor_run_duration: Histogram<f64>,
    objects: Counter<u64>,
    request_processed: Counter<u64>,
    step_skipped: Counter<u64>,
    node_skipped: Counter<u64>,
}

impl Monitor {
    pub fn new(meter: &Meter) -> Self {
        Self {
            pipeline_run_duration: meter
                .f64_histogram("pipeline_run_duration_seconds")
                .with_description("wall-clock duration of one pipeline run")
                .init(),
            step_run_duration: meter
                .f64_histogram("step_run_duration_seconds")
                .with_description("wall-clock duration of one step invocation")
                .init(),
            objects: meter
                .u64_counter("objects")
                .with_description("rows written by the most recent datasource sync")
                .init(),
            request_processed: meter
                .u64_counter("request_processed_total")
                .with_description("requests handled by a component")
                .init(),
            step_skipped: meter
                .u64_counter("step_skipped_total")
                .with_description("steps skipped due to a missing dependency or scope action")
                .init(),
            extractor_run_duration: meter
                .f64_histogram("extractor_run_duration_seconds")
                .with_description("wall-clock duration of one extractor run")
                .init(),
            node_skipped: meter
                .u64_counter("node_skipped_total")
                .with_description("reconciler nodes skipped because recency had not elapsed")
                .init(),
        }
    }

    pub fn record_pipeline_run(&self, pipeline: &str, seconds: f64) {
        self.pipeline_run_duration
            .record(seconds, &[KeyValue::new("pipeline", pipeline.to_string())]);
    }

    pub fn record_step_run(&self, step: &str, seconds: f64) {
        self.step_run_duration
            .record(seconds, &[KeyValue::new("step", step.to_string())]);
    }

    pub fn record_objects(&self, datasource: &str, count: u64) {
        self.objects
            .add(count, &[KeyValue::new("datasource", datasource.to_string())]);
    }

    pub fn record_request_processed(&self, component: &str) {
        self.request_processed
            .add(1, &[KeyValue::new("component", component.to_string())]);
    }

    pub fn record_step_skipped(&self, step: &str) {
        self.step_skipped
            .add(1, &[KeyValue::new("step", step.to_string())]);
    }

    pub fn record_extractor_run(&self, extractor: &str, seconds: f64) {
        self.extractor_run_duration
            .record(seconds, &[KeyValue::new("extractor", extractor.to_string())]);
    }

    pub fn record_node_skipped(&self, node: &str) {
        self.node_skipped
            .add(1, &[KeyValue::new("node", node.to_string())]);
    }
}

/// A no-op gauge placeholder kept for components that want to expose an
/// `ObservableGauge` without wiring a live callback (e.g. in tests).
pub fn noop_gauge(meter: &Meter, name: &'static str) -> ObservableGauge<u64> {
    meter.u64_observable_gauge(name).init()
}
