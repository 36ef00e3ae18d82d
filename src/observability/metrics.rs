//! Metrics sink and Prometheus exposition.
//!
//! # Metrics
//! One histogram per observation name (`http.client.requests`,
//! `http.server.requests` by default), in seconds, labelled with the
//! low-cardinality key values only. High-cardinality values never reach
//! a metric.

use std::net::SocketAddr;

use dashmap::DashSet;
use metrics::{histogram, Label, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observation::registry::{ObservationEvent, ObservationSink};

/// Records every stopped observation as a duration sample.
#[derive(Debug, Default)]
pub struct MetricsSink {
    described: DashSet<String>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe(&self, name: &str) {
        if self.described.insert(name.to_string()) {
            metrics::describe_histogram!(
                name.to_string(),
                Unit::Seconds,
                "Duration of observed HTTP exchanges"
            );
        }
    }
}

impl ObservationSink for MetricsSink {
    fn on_stop(&self, event: &ObservationEvent) {
        self.describe(&event.name);
        let labels: Vec<Label> = event
            .low_cardinality
            .iter()
            .map(|kv| Label::new(kv.key, kv.value.clone()))
            .collect();
        histogram!(event.name.clone(), labels).record(event.duration.as_secs_f64());
    }
}

/// Install the global Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}
