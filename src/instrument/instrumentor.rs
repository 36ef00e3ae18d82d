//! Exchange instrumentor: one observation per logical exchange.
//!
//! # Algorithm
//! ```text
//! create_or_fetch (observation attribute)
//!     → open scope
//!     → downstream(observation)           instrumented with the observation span
//!     → Ok: record response               Err: unwrap one transport layer, record
//!     → close scope
//!     → suspended?  yes: leave attached for re-entry
//!                   no:  merge out-of-band error, stop
//! ```
//!
//! # Design Decisions
//! - Errors are observed, never intercepted: the caller gets the same error
//!   (minus at most one transport wrapper) it would get without instrumentation
//! - Re-entry is keyed on the exchange's attribute store, so a resumed
//!   exchange on another thread finds its observation

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use crate::instrument::exchange::Exchange;
use crate::observation::attributes::{CONTEXT_ATTRIBUTE, OBSERVATION_ATTRIBUTE};
use crate::observation::context::{ExchangeContext, ResponseStatus, SharedContext};
use crate::observation::convention::{DefaultExchangeConvention, ExchangeKind, ObservationConvention};
use crate::observation::error::ExchangeError;
use crate::observation::handle::Observation;
use crate::observation::registry::ObservationRegistry;

/// Wraps downstream calls of one side (client or server) in observations.
#[derive(Clone)]
pub struct ExchangeInstrumentor {
    kind: ExchangeKind,
    registry: ObservationRegistry,
    custom: Option<Arc<dyn ObservationConvention>>,
    default: Arc<dyn ObservationConvention>,
}

impl ExchangeInstrumentor {
    /// Instrumentor using the default convention for `kind`.
    pub fn new(kind: ExchangeKind, registry: ObservationRegistry) -> Self {
        Self {
            kind,
            registry,
            custom: None,
            default: Arc::new(DefaultExchangeConvention::new(kind)),
        }
    }

    /// Consult `convention` before the default one.
    pub fn with_convention(mut self, convention: Arc<dyn ObservationConvention>) -> Self {
        self.custom = Some(convention);
        self
    }

    /// Replace the fallback convention (e.g. to rename the observation).
    pub fn with_default_convention(mut self, convention: Arc<dyn ObservationConvention>) -> Self {
        self.default = convention;
        self
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    /// Observation attached to `exchange`, creating and starting one if absent.
    ///
    /// Creation is atomic per exchange: a concurrent second caller receives
    /// the first caller's observation.
    pub fn create_or_fetch<X: Exchange + ?Sized>(&self, exchange: &X) -> Observation {
        let attributes = exchange.attributes();
        if let Some(existing) = attributes.get::<Observation>(OBSERVATION_ATTRIBUTE) {
            tracing::trace!(observation = %existing.name(), "Re-entering observed exchange");
            if let Some(template) = exchange.uri_template() {
                let mut context = existing.context().lock();
                if context.uri_template().is_none() {
                    context.set_uri_template(template);
                }
            }
            return existing;
        }

        // Built outside the entry lock: reading attributes while holding it
        // could deadlock on the same shard.
        let mut context = match exchange.carrier() {
            Some(carrier) => ExchangeContext::with_carrier(carrier),
            None => ExchangeContext::new(),
        };
        if let Some(template) = exchange.uri_template() {
            context.set_uri_template(template);
        }
        let context = SharedContext::new(context);

        let created = attributes.get_or_insert_with(OBSERVATION_ATTRIBUTE, || {
            self.new_observation(context.clone()).start()
        });

        match created {
            Some((observation, true)) => {
                attributes.set(CONTEXT_ATTRIBUTE, observation.context().clone());
                observation
            }
            Some((observation, false)) => observation,
            None => {
                tracing::warn!(
                    key = OBSERVATION_ATTRIBUTE,
                    "Observation attribute holds another type, observing unattached"
                );
                self.new_observation(context).start()
            }
        }
    }

    fn new_observation(&self, context: SharedContext) -> Observation {
        Observation::new(
            self.kind,
            self.custom.clone(),
            self.default.clone(),
            context,
            self.registry.clone(),
        )
    }

    /// Run `downstream` inside the exchange's observation.
    ///
    /// `downstream` receives the observation explicitly; its future runs
    /// inside the observation's span. The result is returned unchanged,
    /// except that an error is passed through `ExchangeError::unwrap_transport`.
    pub async fn observe<X, F, Fut, R, E>(&self, exchange: &X, downstream: F) -> Result<R, E>
    where
        X: Exchange + ?Sized,
        F: FnOnce(Observation) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: ResponseStatus,
        E: ExchangeError,
    {
        let observation = self.create_or_fetch(exchange);

        let result = {
            let scope = observation.open_scope();
            let span = observation.span().clone();
            let result = downstream(scope.observation().clone()).instrument(span).await;
            drop(scope);
            result
        };

        let result = match result {
            Ok(response) => {
                observation.response(&response);
                if let Some(err) = response.recorded_error() {
                    exchange.attributes().record_observed_error(err);
                }
                Ok(response)
            }
            Err(err) => {
                let err = err.unwrap_transport();
                observation.error(&err);
                Err(err)
            }
        };

        if exchange.is_suspended() {
            tracing::debug!(
                parent: observation.span(),
                "Exchange suspended, deferring stop"
            );
        } else {
            if let Some(err) = exchange.attributes().terminal_error() {
                observation.record_error(err);
            }
            observation.stop();
        }

        result
    }
}

impl std::fmt::Debug for ExchangeInstrumentor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeInstrumentor")
            .field("kind", &self.kind)
            .field("default", &self.default.name())
            .field("custom", &self.custom.as_ref().map(|c| c.name().to_string()))
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::exchange::ExchangeHandle;
    use crate::observation::attributes::ExchangeAttributes;
    use crate::observation::context::RequestHead;
    use crate::observation::convention::{keys, FnConvention};
    use crate::observation::handle::ObservationState;
    use crate::observation::registry::RecordingSink;
    use crate::observation::ObservedError;
    use axum::http::{Method, StatusCode, Uri};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct IllegalState(String);

    impl ExchangeError for IllegalState {}

    #[derive(Debug, thiserror::Error)]
    enum HandlerFailure {
        #[error("dispatch failed")]
        Dispatch(#[source] Box<HandlerFailure>),
        #[error("timed out")]
        Timeout,
    }

    impl ExchangeError for HandlerFailure {
        fn qualified_name(&self) -> std::borrow::Cow<'static, str> {
            match self {
                HandlerFailure::Dispatch(_) => "handler::Dispatch".into(),
                HandlerFailure::Timeout => "handler::Timeout".into(),
            }
        }

        fn unwrap_transport(self) -> Self {
            match self {
                HandlerFailure::Dispatch(cause) => *cause,
                other => other,
            }
        }
    }

    fn instrumentor(sink: &Arc<RecordingSink>) -> ExchangeInstrumentor {
        ExchangeInstrumentor::new(ExchangeKind::Server, ObservationRegistry::new().with_sink(sink.clone()))
    }

    fn exchange(uri: &'static str) -> ExchangeHandle {
        ExchangeHandle::new(
            ExchangeAttributes::new(),
            Some(RequestHead::new(Method::GET, Uri::from_static(uri))),
        )
    }

    #[tokio::test]
    async fn test_success_stops_once() {
        let sink = RecordingSink::new();
        let instrumentor = instrumentor(&sink);
        let exchange = exchange("/resource/42");
        exchange.attributes().set_uri_template("/resource/{id}");

        let result: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |obs| async move {
                assert_eq!(obs.scope_depth(), 1);
                assert_eq!(obs.state(), ObservationState::Started);
                Ok(StatusCode::OK)
            })
            .await;

        assert_eq!(result.unwrap(), StatusCode::OK);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "http.server.requests");
        assert!(event.low_cardinality.contains("uri", "/resource/{id}"));
        assert!(event.low_cardinality.contains("status", "200"));
        assert!(event.low_cardinality.contains("outcome", "SUCCESS"));
        assert!(event.high_cardinality.contains("uri.expanded", "/resource/42"));

        let observation = exchange.attributes().get::<Observation>(OBSERVATION_ATTRIBUTE).unwrap();
        assert_eq!(observation.scope_depth(), 0);
        let context = exchange.attributes().get::<SharedContext>(CONTEXT_ATTRIBUTE).unwrap();
        assert!(context.ptr_eq(observation.context()));
    }

    #[tokio::test]
    async fn test_error_is_returned_unchanged() {
        let sink = RecordingSink::new();
        let exchange = exchange("/resource/42");

        let instrumentor = instrumentor(&sink);
        assert_eq!(instrumentor.kind(), ExchangeKind::Server);

        let result: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |obs| async move {
                assert_eq!(obs.scope_depth(), 1);
                Err(IllegalState("x".into()))
            })
            .await;

        assert_eq!(result.unwrap_err().0, "x");
        let observation = exchange.attributes().get::<Observation>(OBSERVATION_ATTRIBUTE).unwrap();
        assert_eq!(observation.scope_depth(), 0);
        assert_eq!(observation.kind(), ExchangeKind::Server);
        assert_eq!(observation.state(), ObservationState::Stopped);
        let event = &sink.events()[0];
        assert!(event.low_cardinality.contains("exception", "IllegalState"));
        assert!(event.low_cardinality.contains("status", "CLIENT_ERROR"));
        assert!(event.low_cardinality.contains("outcome", "UNKNOWN"));
    }

    #[tokio::test]
    async fn test_transport_wrapper_is_unwrapped_once() {
        let sink = RecordingSink::new();
        let exchange = exchange("/slow");

        let result: Result<StatusCode, HandlerFailure> = instrumentor(&sink)
            .observe(&exchange, |_| async {
                Err(HandlerFailure::Dispatch(Box::new(HandlerFailure::Timeout)))
            })
            .await;

        assert!(matches!(result, Err(HandlerFailure::Timeout)));
        assert!(sink.events()[0].low_cardinality.contains("exception", "Timeout"));
    }

    #[tokio::test]
    async fn test_async_reentry_stops_on_resume() {
        let sink = RecordingSink::new();
        let instrumentor = instrumentor(&sink);
        let exchange = exchange("/jobs/7");

        // First pass: handler starts async processing.
        let first: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |_| {
                let attributes = exchange.attributes().clone();
                async move {
                    attributes.suspend();
                    Ok(StatusCode::OK)
                }
            })
            .await;
        assert!(first.is_ok());
        assert!(sink.events().is_empty());
        let observation = exchange.attributes().get::<Observation>(OBSERVATION_ATTRIBUTE).unwrap();
        assert_eq!(observation.state(), ObservationState::Started);
        assert_eq!(observation.scope_depth(), 0);

        // Async handler fails out of band, then the exchange resumes.
        exchange.attributes().record_error(&IllegalState("worker crashed".into()));
        exchange.attributes().resume();

        let second: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |obs| {
                let same = obs.ptr_eq(&observation);
                async move {
                    assert!(same);
                    Ok(StatusCode::INTERNAL_SERVER_ERROR)
                }
            })
            .await;
        assert!(second.is_ok());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].low_cardinality.contains("exception", "IllegalState"));
        assert!(events[0].low_cardinality.contains("status", "500"));
        assert!(events[0].low_cardinality.contains("outcome", "SERVER_ERROR"));
        assert_eq!(sink.started_count(), 1);

        // A late third pass must not emit again.
        let third: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |_| async { Ok(StatusCode::OK) })
            .await;
        assert!(third.is_ok());
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_suspended_failure_is_recorded_but_not_stopped() {
        let sink = RecordingSink::new();
        let instrumentor = instrumentor(&sink);
        let exchange = exchange("/jobs/8");
        exchange.attributes().suspend();

        let first: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |_| async { Err(IllegalState("early".into())) })
            .await;
        assert!(first.is_err());
        assert!(sink.events().is_empty());

        exchange.attributes().resume();
        let second: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |_| async { Err(IllegalState("late".into())) })
            .await;
        assert!(second.is_err());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error.as_ref().map(|e| e.message()), Some("early"));
    }

    #[tokio::test]
    async fn test_response_extension_error_is_merged() {
        let sink = RecordingSink::new();
        let exchange = exchange("/fail");

        let result: Result<axum::http::Response<()>, IllegalState> = instrumentor(&sink)
            .observe(&exchange, |_| async {
                let mut response = axum::http::Response::new(());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
                    .extensions_mut()
                    .insert(ObservedError::capture(&IllegalState("handler".into())));
                Ok(response)
            })
            .await;

        assert!(result.is_ok());
        let event = &sink.events()[0];
        assert!(event.low_cardinality.contains("exception", "IllegalState"));
        assert!(event.low_cardinality.contains("status", "500"));
    }

    #[tokio::test]
    async fn test_degenerate_exchange() {
        let sink = RecordingSink::new();
        let exchange = ExchangeHandle::new(ExchangeAttributes::new(), None);

        let result: Result<StatusCode, IllegalState> = instrumentor(&sink)
            .observe(&exchange, |obs| async move {
                obs.context().lock().set_uri_template("/late/{id}");
                Ok(StatusCode::NO_CONTENT)
            })
            .await;
        assert!(result.is_ok());
        let event = &sink.events()[0];
        assert!(event.low_cardinality.contains("method", "none"));
        assert!(event.low_cardinality.contains("uri", "/late/{id}"));
        assert!(event.low_cardinality.contains("status", "204"));
        assert!(event.high_cardinality.contains("client.name", "none"));
        assert!(event.high_cardinality.contains("uri.expanded", "none"));
    }

    #[tokio::test]
    async fn test_custom_convention_applies() {
        let sink = RecordingSink::new();
        let custom = FnConvention::named("orders.server")
            .low_cardinality(keys::URI, |ctx| ctx.uri_template().unwrap_or("unmatched").to_string());
        let instrumentor = instrumentor(&sink).with_convention(Arc::new(custom));
        let exchange = exchange("/orders/1");

        let _: Result<StatusCode, IllegalState> = instrumentor
            .observe(&exchange, |_| async { Ok(StatusCode::NOT_FOUND) })
            .await;

        let event = &sink.events()[0];
        assert_eq!(event.name, "orders.server");
        assert!(event.low_cardinality.contains("uri", "unmatched"));
        assert!(event.low_cardinality.contains("outcome", "CLIENT_ERROR"));
    }

    #[test]
    fn test_concurrent_create_or_fetch_shares_observation() {
        let sink = RecordingSink::new();
        let instrumentor = instrumentor(&sink);
        let exchange = exchange("/race");

        let observations: Vec<Observation> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| instrumentor.create_or_fetch(&exchange)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(observations.windows(2).all(|w| w[0].ptr_eq(&w[1])));
        assert_eq!(sink.started_count(), 1);
    }

    #[test]
    fn test_foreign_attribute_value_does_not_break_observation() {
        let sink = RecordingSink::new();
        let exchange = exchange("/odd");
        exchange.attributes().set(OBSERVATION_ATTRIBUTE, 42u8);
        let observation = instrumentor(&sink).create_or_fetch(&exchange);
        assert_eq!(observation.state(), ObservationState::Started);
        assert!(observation.stop());
        assert_eq!(sink.events().len(), 1);
    }
}
