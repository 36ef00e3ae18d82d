//! Log sink for stopped observations.
//!
//! Unlike metrics, the log event carries the high-cardinality labels
//! (`uri.expanded`, `client.name`) and the error message.

use crate::observation::registry::{ObservationEvent, ObservationSink};

/// Emits one tracing event per stopped observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl ObservationSink for TracingSink {
    fn on_stop(&self, event: &ObservationEvent) {
        let duration_ms = event.duration.as_secs_f64() * 1000.0;
        match &event.error {
            Some(error) => tracing::warn!(
                observation = %event.name,
                kind = %event.kind,
                duration_ms,
                low = %event.low_cardinality,
                high = %event.high_cardinality,
                error = %error,
                "Observed exchange failed"
            ),
            None => tracing::info!(
                observation = %event.name,
                kind = %event.kind,
                duration_ms,
                low = %event.low_cardinality,
                high = %event.high_cardinality,
                "Observed exchange completed"
            ),
        }
    }
}
