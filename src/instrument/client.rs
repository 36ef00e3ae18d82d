//! Outbound instrumentation around the hyper-util client.
//!
//! # Responsibilities
//! - Wrap each outgoing request in a client observation
//! - Carry the unexpanded URI template from a `UriTemplate` request extension
//! - Return the client's own error type unchanged
//! - Start a fresh exchange per request, even for a forwarded inbound request

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;

use crate::instrument::exchange::{ExchangeHandle, UriTemplate};
use crate::instrument::instrumentor::ExchangeInstrumentor;
use crate::observation::attributes::ExchangeAttributes;
use crate::observation::convention::ExchangeKind;
use crate::observation::registry::ObservationRegistry;

/// HTTP client whose exchanges are observed.
#[derive(Clone, Debug)]
pub struct ObservedClient {
    client: Client<HttpConnector, Body>,
    instrumentor: Arc<ExchangeInstrumentor>,
}

impl ObservedClient {
    pub fn new(registry: ObservationRegistry) -> Self {
        Self::with_instrumentor(ExchangeInstrumentor::new(ExchangeKind::Client, registry))
    }

    pub fn with_instrumentor(instrumentor: ExchangeInstrumentor) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            instrumentor: Arc::new(instrumentor),
        }
    }

    /// Send a request. Attach a `UriTemplate` extension to label it by template.
    ///
    /// Each call is a new outbound exchange: `ExchangeAttributes` carried over
    /// from a forwarded inbound request are replaced, never re-entered.
    pub async fn request(&self, mut req: Request<Body>) -> Result<Response<Incoming>, ClientError> {
        req.extensions_mut().remove::<ExchangeAttributes>();
        let exchange = ExchangeHandle::from_request(&mut req);
        tracing::debug!(
            method = %req.method(),
            uri = %req.uri(),
            "Sending observed request"
        );
        let client = self.client.clone();
        self.instrumentor
            .observe(&exchange, move |_observation| client.request(req))
            .await
    }

    /// Send a request labelled with `template`.
    pub async fn request_templated(
        &self,
        template: &str,
        mut req: Request<Body>,
    ) -> Result<Response<Incoming>, ClientError> {
        req.extensions_mut().insert(UriTemplate::new(template));
        self.request(req).await
    }
}
