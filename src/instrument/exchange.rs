//! The exchange as seen by the instrumentor.

use axum::http::Request;

use crate::observation::attributes::ExchangeAttributes;
use crate::observation::context::RequestHead;

/// An in-flight exchange: its attribute store, its request head and its
/// suspension state. Implemented by the transport layer.
pub trait Exchange {
    fn attributes(&self) -> &ExchangeAttributes;

    /// The request head, if the request has been built.
    fn carrier(&self) -> Option<RequestHead>;

    fn uri_template(&self) -> Option<String> {
        self.attributes().uri_template()
    }

    /// True while the exchange awaits asynchronous completion.
    fn is_suspended(&self) -> bool {
        self.attributes().is_suspended()
    }
}

/// Unexpanded URI template attached to an outgoing request's extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate(pub String);

impl UriTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Plain exchange: a request head plus its attribute store.
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    attributes: ExchangeAttributes,
    carrier: Option<RequestHead>,
}

impl ExchangeHandle {
    pub fn new(attributes: ExchangeAttributes, carrier: Option<RequestHead>) -> Self {
        Self {
            attributes,
            carrier,
        }
    }

    /// Build from a request, reusing the `ExchangeAttributes` in its
    /// extensions or inserting fresh ones. A `UriTemplate` extension, if
    /// present, is copied into the store.
    pub fn from_request<B>(req: &mut Request<B>) -> Self {
        let attributes = match req.extensions().get::<ExchangeAttributes>() {
            Some(existing) => existing.clone(),
            None => {
                let fresh = ExchangeAttributes::new();
                req.extensions_mut().insert(fresh.clone());
                fresh
            }
        };
        if let Some(template) = req.extensions().get::<UriTemplate>() {
            attributes.set_uri_template(template.as_str());
        }
        Self::new(attributes, Some(RequestHead::from(&*req)))
    }
}

impl Exchange for ExchangeHandle {
    fn attributes(&self) -> &ExchangeAttributes {
        &self.attributes
    }

    fn carrier(&self) -> Option<RequestHead> {
        self.carrier.clone()
    }
}
