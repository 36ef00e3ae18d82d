//! Exchange context: the data an observation accumulates.
//!
//! # Responsibilities
//! - Hold the request carrier, response status, URI template and terminal error
//! - Provide the only mutation path (setters) while the exchange is in flight
//! - Keep the first recorded error; later errors are ignored
//!
//! # Design Decisions
//! - Carrier and response are snapshots (method + URI, status result),
//!   so the context never borrows transport objects
//! - A failed status read is kept as a value and resolved at label time

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::{request, response, Method, Request, Response, StatusCode, Uri};

use crate::observation::error::{ObservedError, StatusReadError};

/// Method and URI of the request that started the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri }
    }
}

impl<B> From<&Request<B>> for RequestHead {
    fn from(req: &Request<B>) -> Self {
        Self::new(req.method().clone(), req.uri().clone())
    }
}

impl From<&request::Parts> for RequestHead {
    fn from(parts: &request::Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone())
    }
}

/// Anything that can report a response status.
pub trait ResponseStatus {
    /// Read the status code. Transports whose status read can fail return an error.
    fn status_code(&self) -> Result<StatusCode, StatusReadError>;

    /// An error a downstream handler attached to the response instead of returning it.
    fn recorded_error(&self) -> Option<ObservedError> {
        None
    }
}

impl ResponseStatus for StatusCode {
    fn status_code(&self) -> Result<StatusCode, StatusReadError> {
        Ok(*self)
    }
}

impl<B> ResponseStatus for Response<B> {
    fn status_code(&self) -> Result<StatusCode, StatusReadError> {
        Ok(self.status())
    }

    fn recorded_error(&self) -> Option<ObservedError> {
        self.extensions().get::<ObservedError>().cloned()
    }
}

impl ResponseStatus for response::Parts {
    fn status_code(&self) -> Result<StatusCode, StatusReadError> {
        Ok(self.status)
    }

    fn recorded_error(&self) -> Option<ObservedError> {
        self.extensions.get::<ObservedError>().cloned()
    }
}

impl ResponseStatus for Result<StatusCode, StatusReadError> {
    fn status_code(&self) -> Result<StatusCode, StatusReadError> {
        self.clone()
    }
}

/// Response as seen by the context: the outcome of reading its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    status: Result<StatusCode, StatusReadError>,
}

impl ResponseSnapshot {
    pub fn of<R: ResponseStatus + ?Sized>(response: &R) -> Self {
        Self {
            status: response.status_code(),
        }
    }

    pub fn status(&self) -> Result<StatusCode, &StatusReadError> {
        self.status.as_ref().copied()
    }
}

/// Data accumulated over one exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext {
    carrier: Option<RequestHead>,
    response: Option<ResponseSnapshot>,
    uri_template: Option<String>,
    error: Option<ObservedError>,
}

impl ExchangeContext {
    /// An empty context: no carrier, response, template or error.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context for a known request.
    pub fn with_carrier(carrier: RequestHead) -> Self {
        Self {
            carrier: Some(carrier),
            ..Self::default()
        }
    }

    pub fn carrier(&self) -> Option<&RequestHead> {
        self.carrier.as_ref()
    }

    pub fn response(&self) -> Option<&ResponseSnapshot> {
        self.response.as_ref()
    }

    pub fn uri_template(&self) -> Option<&str> {
        self.uri_template.as_deref()
    }

    pub fn error(&self) -> Option<&ObservedError> {
        self.error.as_ref()
    }

    pub fn set_carrier(&mut self, carrier: RequestHead) {
        self.carrier = Some(carrier);
    }

    /// Record the response. A later response replaces an earlier one.
    pub fn set_response<R: ResponseStatus + ?Sized>(&mut self, response: &R) {
        self.response = Some(ResponseSnapshot::of(response));
    }

    pub fn set_uri_template(&mut self, template: impl Into<String>) {
        self.uri_template = Some(template.into());
    }

    /// Record the terminal error. Returns false if one was already set.
    pub fn set_error(&mut self, error: ObservedError) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.error = Some(error);
        true
    }
}

/// Context shared between an observation and the exchange's attribute store.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<Mutex<ExchangeContext>>,
}

impl SharedContext {
    pub fn new(context: ExchangeContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Lock the context. A poisoned lock still yields the data.
    pub fn lock(&self) -> MutexGuard<'_, ExchangeContext> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone the current state.
    pub fn snapshot(&self) -> ExchangeContext {
        self.lock().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
