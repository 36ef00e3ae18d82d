//! Errors observed at the instrumentation point.
//!
//! # Responsibilities
//! - Describe a failure without taking ownership of it (`ObservedError`)
//! - Name errors the way the `exception` label expects (short type name)
//! - Detect transport-level I/O failures anywhere in the source chain
//! - Peel exactly one layer of transport wrapping (`ExchangeError::unwrap_transport`)
//!
//! # Design Decisions
//! - Capture is by reference: the caller always gets its original error back
//! - Unwrapping is finite; there is no loop over the source chain

use std::borrow::Cow;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// An error that can cross the instrumentation point.
///
/// Every method has a default, so most error types only need an empty impl.
pub trait ExchangeError: StdError + Send + Sync + Sized + 'static {
    /// Fully-qualified name used for the `exception` label.
    fn qualified_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// Returns true if this error (or any of its sources) is a transport I/O failure.
    fn is_transport_io(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if err.is::<std::io::Error>() {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// Removes one layer of transport wrapping.
    ///
    /// Wrapper types return their cause; everything else returns itself.
    fn unwrap_transport(self) -> Self {
        self
    }

    /// Description recorded on the observation.
    ///
    /// Wrappers whose cause has a different type (so `unwrap_transport`
    /// cannot return it) describe the cause here instead.
    fn observed(&self) -> ObservedError {
        ObservedError::capture(self)
    }
}

impl ExchangeError for std::io::Error {}

impl ExchangeError for hyper::Error {}

impl ExchangeError for hyper_util::client::legacy::Error {
    /// Names the transport cause beneath the client wrapper: the first
    /// `io::Error` or `hyper::Error` in the source chain.
    fn observed(&self) -> ObservedError {
        let mut current = self.source();
        while let Some(err) = current {
            if let Some(io) = err.downcast_ref::<std::io::Error>() {
                return ObservedError::capture(io);
            }
            if let Some(hyper) = err.downcast_ref::<hyper::Error>() {
                return ObservedError::capture(hyper);
            }
            current = err.source();
        }
        ObservedError::capture(self)
    }
}

impl ExchangeError for Infallible {}

/// Owned description of a recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedError {
    qualified_name: Cow<'static, str>,
    message: String,
    transport_io: bool,
}

impl ObservedError {
    /// Build a description by hand (e.g. for errors raised outside Rust types).
    pub fn new(
        qualified_name: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
        transport_io: bool,
    ) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            message: message.into(),
            transport_io,
        }
    }

    /// Capture a description of `err` without consuming it.
    pub fn capture<E: ExchangeError>(err: &E) -> Self {
        Self {
            qualified_name: err.qualified_name(),
            message: err.to_string(),
            transport_io: err.is_transport_io(),
        }
    }

    /// The fully-qualified name of the error type.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Last path segment of the qualified name, generics stripped. May be blank.
    pub fn short_name(&self) -> &str {
        short_name(&self.qualified_name)
    }

    /// The error's display message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if the failure came from the transport's I/O layer.
    pub fn is_transport_io(&self) -> bool {
        self.transport_io
    }
}

impl fmt::Display for ObservedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.qualified_name, self.message)
    }
}

fn short_name(qualified: &str) -> &str {
    let base = qualified.split('<').next().unwrap_or(qualified);
    base.rsplit("::").next().unwrap_or(base)
}

/// Failure to read a response status from the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to read response status: {0}")]
pub struct StatusReadError(pub String);

impl From<std::io::Error> for StatusReadError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}
