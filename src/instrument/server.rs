//! Inbound instrumentation as a tower middleware.
//!
//! # Responsibilities
//! - Wrap every request reaching the inner service in a server observation
//! - Share `ExchangeAttributes` through request extensions, so a request
//!   passing the layer twice re-enters the same observation
//! - Take the URI template from axum's `MatchedPath` (use `route_layer`)
//!
//! Handlers report failures they turn into responses by inserting an
//! `ObservedError` into the response extensions, or by recording it on the
//! `ExchangeAttributes` extension.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::instrument::exchange::{Exchange, ExchangeHandle};
use crate::instrument::instrumentor::ExchangeInstrumentor;
use crate::observation::convention::ExchangeKind;
use crate::observation::error::ExchangeError;
use crate::observation::registry::ObservationRegistry;

/// [`Layer`] applying server-side exchange observation.
#[derive(Clone, Debug)]
pub struct ServerObservationLayer {
    instrumentor: Arc<ExchangeInstrumentor>,
}

impl ServerObservationLayer {
    pub fn new(registry: ObservationRegistry) -> Self {
        Self::with_instrumentor(ExchangeInstrumentor::new(ExchangeKind::Server, registry))
    }

    pub fn with_instrumentor(instrumentor: ExchangeInstrumentor) -> Self {
        Self {
            instrumentor: Arc::new(instrumentor),
        }
    }
}

impl<S> Layer<S> for ServerObservationLayer {
    type Service = ServerObservationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ServerObservationService {
            instrumentor: self.instrumentor.clone(),
            inner,
        }
    }
}

/// [`Service`] produced by [`ServerObservationLayer`].
#[derive(Clone, Debug)]
pub struct ServerObservationService<S> {
    instrumentor: Arc<ExchangeInstrumentor>,
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ServerObservationService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: ExchangeError,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the one poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let instrumentor = self.instrumentor.clone();

        let exchange = ExchangeHandle::from_request(&mut req);
        if let Some(path) = req.extensions().get::<MatchedPath>() {
            if exchange.attributes().uri_template().is_none() {
                exchange.attributes().set_uri_template(path.as_str());
            }
        }

        Box::pin(async move {
            instrumentor
                .observe(&exchange, move |_observation| inner.call(req))
                .await
        })
    }
}
