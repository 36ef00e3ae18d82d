//! Observation registry and sinks.
//!
//! # Data Flow
//! ```text
//! Observation::stop()
//!     → conventions resolve low/high key values
//!     → ObservationEvent
//!     → ObservationRegistry::emit()
//!     → every ObservationSink::on_stop()
//! ```
//!
//! Sinks live in `observability` (metrics, tracing); this module only
//! defines the seam and an in-memory sink used by tests and embedders.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::observation::context::ExchangeContext;
use crate::observation::convention::{ExchangeKind, KeyValues};
use crate::observation::error::ObservedError;

/// What an observation hands to its sinks when it stops.
#[derive(Debug, Clone)]
pub struct ObservationEvent {
    pub name: String,
    pub kind: ExchangeKind,
    pub low_cardinality: KeyValues,
    pub high_cardinality: KeyValues,
    pub duration: Duration,
    pub error: Option<ObservedError>,
}

/// External consumer of observation output.
pub trait ObservationSink: Send + Sync {
    /// Called once when an observation starts.
    fn on_start(&self, _name: &str, _kind: ExchangeKind, _context: &ExchangeContext) {}

    /// Called exactly once when an observation stops.
    fn on_stop(&self, event: &ObservationEvent);
}

/// Set of sinks shared by every observation an instrumentor creates.
#[derive(Clone, Default)]
pub struct ObservationRegistry {
    sinks: Vec<Arc<dyn ObservationSink>>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no sinks: lifecycle still runs, nothing is emitted.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.sinks.is_empty()
    }

    pub(crate) fn started(&self, name: &str, kind: ExchangeKind, context: &ExchangeContext) {
        for sink in &self.sinks {
            sink.on_start(name, kind, context);
        }
    }

    pub(crate) fn emit(&self, event: &ObservationEvent) {
        for sink in &self.sinks {
            sink.on_stop(event);
        }
    }
}

impl std::fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Sink that keeps every stopped event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    started: Mutex<usize>,
    events: Mutex<Vec<ObservationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ObservationEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Events emitted under a given observation name.
    pub fn events_named(&self, name: &str) -> Vec<ObservationEvent> {
        self.events().into_iter().filter(|e| e.name == name).collect()
    }

    pub fn started_count(&self) -> usize {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObservationSink for RecordingSink {
    fn on_start(&self, _name: &str, _kind: ExchangeKind, _context: &ExchangeContext) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn on_stop(&self, event: &ObservationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
