//! Observation lifecycle handle.
//!
//! # States
//! ```text
//! NotStarted → Started   start()
//! Started    → Stopped   stop()   (label extraction + emission, once)
//! ```
//!
//! # Design Decisions
//! - State is a single atomic; `stop` wins by compare-exchange, so two
//!   threads racing to stop emit exactly one event
//! - Scopes only count; closing a scope never stops the observation
//! - The active observation is passed explicitly (and via the tracing span),
//!   never looked up from thread-local state

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::Span;

use crate::observation::context::{ExchangeContext, ResponseStatus, SharedContext};
use crate::observation::convention::{resolve_key_values, ExchangeKind, ObservationConvention};
use crate::observation::error::{ExchangeError, ObservedError};
use crate::observation::registry::{ObservationEvent, ObservationRegistry};

/// Lifecycle state of an observation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationState {
    NotStarted = 0,
    Started = 1,
    Stopped = 2,
}

impl From<u8> for ObservationState {
    fn from(val: u8) -> Self {
        match val {
            1 => ObservationState::Started,
            2 => ObservationState::Stopped,
            _ => ObservationState::NotStarted,
        }
    }
}

struct Inner {
    kind: ExchangeKind,
    state: AtomicU8,
    scope_depth: AtomicUsize,
    context: SharedContext,
    custom: Option<Arc<dyn ObservationConvention>>,
    default: Arc<dyn ObservationConvention>,
    registry: ObservationRegistry,
    started_at: Mutex<Option<Instant>>,
    span: Span,
}

/// Handle to one exchange's observation. Clones refer to the same observation.
#[derive(Clone)]
pub struct Observation {
    inner: Arc<Inner>,
}

impl Observation {
    /// Create an observation in the `NotStarted` state.
    pub fn new(
        kind: ExchangeKind,
        custom: Option<Arc<dyn ObservationConvention>>,
        default: Arc<dyn ObservationConvention>,
        context: SharedContext,
        registry: ObservationRegistry,
    ) -> Self {
        let name = custom
            .as_ref()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| default.name().to_string());
        let span = tracing::info_span!("http.exchange", observation = %name, kind = %kind);
        Self {
            inner: Arc::new(Inner {
                kind,
                state: AtomicU8::new(ObservationState::NotStarted as u8),
                scope_depth: AtomicUsize::new(0),
                context,
                custom,
                default,
                registry,
                started_at: Mutex::new(None),
                span,
            }),
        }
    }

    /// Observation name: the custom convention's if present, else the default's.
    pub fn name(&self) -> &str {
        match &self.inner.custom {
            Some(custom) => custom.name(),
            None => self.inner.default.name(),
        }
    }

    pub fn kind(&self) -> ExchangeKind {
        self.inner.kind
    }

    pub fn state(&self) -> ObservationState {
        ObservationState::from(self.inner.state.load(Ordering::SeqCst))
    }

    /// Shared context; the same one stored under the context attribute.
    pub fn context(&self) -> &SharedContext {
        &self.inner.context
    }

    /// Span covering the exchange. Downstream work is instrumented with it.
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Start the observation. Starting twice is a caller error and is ignored.
    pub fn start(self) -> Self {
        let started = self.inner.state.compare_exchange(
            ObservationState::NotStarted as u8,
            ObservationState::Started as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match started {
            Ok(_) => {
                *self.inner.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
                let context = self.inner.context.snapshot();
                self.inner.registry.started(self.name(), self.inner.kind, &context);
                tracing::trace!(parent: &self.inner.span, "Observation started");
            }
            Err(state) => {
                tracing::warn!(
                    observation = %self.name(),
                    state = ?ObservationState::from(state),
                    "Observation started more than once"
                );
            }
        }
        self
    }

    /// Record a terminal error. The first recorded error wins.
    pub fn error<E: ExchangeError>(&self, err: &E) -> &Self {
        self.record_error(err.observed())
    }

    /// Record an already-captured terminal error. The first recorded error wins.
    pub fn record_error(&self, err: ObservedError) -> &Self {
        if !self.inner.context.lock().set_error(err) {
            tracing::trace!(parent: &self.inner.span, "Terminal error already recorded");
        }
        self
    }

    pub fn response<R: ResponseStatus + ?Sized>(&self, response: &R) -> &Self {
        self.inner.context.lock().set_response(response);
        self
    }

    /// Open a scope. The returned guard closes it on drop.
    pub fn open_scope(&self) -> ObservationScope {
        self.inner.scope_depth.fetch_add(1, Ordering::SeqCst);
        ObservationScope {
            observation: self.clone(),
        }
    }

    /// Number of currently open scopes.
    pub fn scope_depth(&self) -> usize {
        self.inner.scope_depth.load(Ordering::SeqCst)
    }

    /// Stop the observation and emit its labels.
    ///
    /// Only the first stop of a started observation emits; it returns true.
    /// Every other call is a no-op returning false.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.state.compare_exchange(
            ObservationState::Started as u8,
            ObservationState::Stopped as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if let Err(state) = stopped {
            tracing::debug!(
                observation = %self.name(),
                state = ?ObservationState::from(state),
                "Ignoring stop"
            );
            return false;
        }

        let duration = self.elapsed();
        let context = self.inner.context.snapshot();
        let (low_cardinality, high_cardinality) =
            resolve_key_values(self.inner.custom.as_deref(), self.inner.default.as_ref(), &context);

        let event = ObservationEvent {
            name: self.name().to_string(),
            kind: self.inner.kind,
            low_cardinality,
            high_cardinality,
            duration,
            error: context.error().cloned(),
        };
        self.inner.span.in_scope(|| self.inner.registry.emit(&event));
        true
    }

    fn elapsed(&self) -> Duration {
        self.inner
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("name", &self.name())
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("scope_depth", &self.scope_depth())
            .finish()
    }
}

/// An open scope. Dropping it closes the scope without stopping the observation.
#[derive(Debug)]
pub struct ObservationScope {
    observation: Observation,
}

impl ObservationScope {
    pub fn observation(&self) -> &Observation {
        &self.observation
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        self.observation.inner.scope_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Convenience for building a started observation over a fresh context.
pub fn start_observation(
    kind: ExchangeKind,
    custom: Option<Arc<dyn ObservationConvention>>,
    default: Arc<dyn ObservationConvention>,
    context: ExchangeContext,
    registry: ObservationRegistry,
) -> Observation {
    Observation::new(kind, custom, default, SharedContext::new(context), registry).start()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::convention::{DefaultExchangeConvention, FnConvention, keys};
    use crate::observation::registry::RecordingSink;
    use axum::http::StatusCode;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct IllegalState(String);

    impl ExchangeError for IllegalState {}

    fn observation(sink: &Arc<RecordingSink>) -> Observation {
        let registry = ObservationRegistry::new().with_sink(sink.clone());
        Observation::new(
            ExchangeKind::Client,
            None,
            Arc::new(DefaultExchangeConvention::new(ExchangeKind::Client)),
            SharedContext::new(ExchangeContext::new()),
            registry,
        )
    }

    #[test]
    fn test_lifecycle_transitions() {
        let sink = RecordingSink::new();
        let obs = observation(&sink);
        assert_eq!(obs.state(), ObservationState::NotStarted);
        let obs = obs.start();
        assert_eq!(obs.state(), ObservationState::Started);
        assert_eq!(sink.started_count(), 1);
        assert!(obs.stop());
        assert_eq!(obs.state(), ObservationState::Stopped);
    }

    #[test]
    fn test_stop_emits_once() {
        let sink = RecordingSink::new();
        let obs = observation(&sink).start();
        assert!(obs.stop());
        assert!(!obs.stop());
        assert!(!obs.clone().stop());
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_concurrent_stop_emits_once() {
        let sink = RecordingSink::new();
        let obs = observation(&sink).start();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let obs = obs.clone();
                std::thread::spawn(move || obs.stop())
            })
            .collect();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(wins, 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let sink = RecordingSink::new();
        let obs = observation(&sink);
        assert!(!obs.stop());
        assert!(sink.events().is_empty());
        assert_eq!(obs.state(), ObservationState::NotStarted);
    }

    #[test]
    fn test_second_start_is_ignored() {
        let sink = RecordingSink::new();
        let obs = observation(&sink).start().start();
        assert_eq!(sink.started_count(), 1);
        assert!(obs.stop());
        let obs = obs.start();
        assert_eq!(obs.state(), ObservationState::Stopped);
    }

    #[test]
    fn test_degenerate_exchange_stops_with_sentinels() {
        let sink = RecordingSink::new();
        let obs = observation(&sink).start();
        assert!(obs.stop());
        let event = &sink.events()[0];
        assert_eq!(event.name, "http.client.requests");
        assert!(event.low_cardinality.contains("status", "CLIENT_ERROR"));
        assert!(event.low_cardinality.contains("outcome", "UNKNOWN"));
        assert!(event.high_cardinality.contains("uri.expanded", "none"));
        assert!(event.error.is_none());
    }

    #[test]
    fn test_first_error_wins() {
        let sink = RecordingSink::new();
        let obs = observation(&sink).start();
        obs.error(&IllegalState("first".into()))
            .error(&std::io::Error::other("second"));
        obs.response(&StatusCode::BAD_GATEWAY);
        obs.stop();
        let event = &sink.events()[0];
        assert!(event.low_cardinality.contains("exception", "IllegalState"));
        assert!(event.low_cardinality.contains("status", "502"));
        assert!(event.low_cardinality.contains("outcome", "SERVER_ERROR"));
        assert_eq!(event.error.as_ref().map(|e| e.message()), Some("first"));
    }

    #[test]
    fn test_scopes_nest_without_stopping() {
        let sink = RecordingSink::new();
        let obs = observation(&sink).start();
        {
            let outer = obs.open_scope();
            assert_eq!(obs.scope_depth(), 1);
            {
                let inner = outer.observation().open_scope();
                assert_eq!(obs.scope_depth(), 2);
                assert!(inner.observation().ptr_eq(&obs));
            }
            assert_eq!(obs.scope_depth(), 1);
        }
        assert_eq!(obs.scope_depth(), 0);
        assert_eq!(obs.state(), ObservationState::Started);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_custom_convention_names_observation() {
        let sink = RecordingSink::new();
        let registry = ObservationRegistry::new().with_sink(sink.clone());
        let custom: Arc<dyn ObservationConvention> = Arc::new(
            FnConvention::named("payments.client").low_cardinality(keys::URI, |_| "payments".to_string()),
        );
        let obs = start_observation(
            ExchangeKind::Client,
            Some(custom),
            Arc::new(DefaultExchangeConvention::new(ExchangeKind::Client)),
            ExchangeContext::new(),
            registry,
        );
        assert_eq!(obs.name(), "payments.client");
        obs.stop();
        let event = &sink.events()[0];
        assert_eq!(event.name, "payments.client");
        assert!(event.low_cardinality.contains("uri", "payments"));
        assert!(event.low_cardinality.contains("method", "none"));
    }
}
