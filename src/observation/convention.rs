//! Observation conventions: context → labels.
//!
//! # Responsibilities
//! - Define the label schema (`keys`) and its sentinel values
//! - Derive low-cardinality labels (metrics-safe) and high-cardinality labels
//!   (tracing-only) from an `ExchangeContext`
//! - Merge a custom convention over the default one
//!
//! # Label Schema
//! ```text
//! low:  uri, method, status, exception, outcome
//! high: uri.expanded, client.name
//! ```
//!
//! # Design Decisions
//! - Every label is always emitted; missing data maps to a sentinel
//! - Unbounded values (expanded URI, host) only ever appear in high-cardinality output
//! - Custom conventions are trait objects or a per-label closure table (`FnConvention`)

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::observation::context::ExchangeContext;

/// Label names.
pub mod keys {
    pub const URI: &str = "uri";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const EXCEPTION: &str = "exception";
    pub const OUTCOME: &str = "outcome";
    pub const URI_EXPANDED: &str = "uri.expanded";
    pub const CLIENT_NAME: &str = "client.name";
}

const NONE: &str = "none";
const CLIENT_ERROR: &str = "CLIENT_ERROR";
const IO_ERROR: &str = "IO_ERROR";
const UNKNOWN: &str = "UNKNOWN";

/// Default observation name for outbound exchanges.
pub const CLIENT_OBSERVATION_NAME: &str = "http.client.requests";
/// Default observation name for inbound exchanges.
pub const SERVER_OBSERVATION_NAME: &str = "http.server.requests";

/// Which side of the exchange is being observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Client,
    Server,
}

impl ExchangeKind {
    pub fn default_name(self) -> &'static str {
        match self {
            ExchangeKind::Client => CLIENT_OBSERVATION_NAME,
            ExchangeKind::Server => SERVER_OBSERVATION_NAME,
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Client => f.write_str("client"),
            ExchangeKind::Server => f.write_str("server"),
        }
    }
}

/// A single label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    pub key: &'static str,
    pub value: String,
}

impl KeyValue {
    pub fn of(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered set of labels, unique by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues(Vec<KeyValue>);

impl KeyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(values: impl IntoIterator<Item = KeyValue>) -> Self {
        let mut kvs = Self::new();
        for kv in values {
            kvs.insert(kv);
        }
        kvs
    }

    /// Insert a label, replacing the value in place if the key exists.
    pub fn insert(&mut self, kv: KeyValue) {
        match self.0.iter_mut().find(|existing| existing.key == kv.key) {
            Some(existing) => existing.value = kv.value,
            None => self.0.push(kv),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|kv| kv.key == key).map(|kv| kv.value.as_str())
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Layer `overrides` on top of `self`: keys keep their position,
    /// overridden values win, new keys are appended.
    pub fn merged_with(mut self, overrides: KeyValues) -> Self {
        for kv in overrides.0 {
            self.insert(kv);
        }
        self
    }
}

impl IntoIterator for KeyValues {
    type Item = KeyValue;
    type IntoIter = std::vec::IntoIter<KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, kv) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kv)?;
        }
        f.write_str("}")
    }
}

/// Policy converting an exchange context into labels.
pub trait ObservationConvention: Send + Sync {
    /// Observation name (the metric name).
    fn name(&self) -> &str;

    fn low_cardinality_key_values(&self, context: &ExchangeContext) -> KeyValues;

    fn high_cardinality_key_values(&self, context: &ExchangeContext) -> KeyValues;
}

/// The built-in convention.
#[derive(Debug, Clone)]
pub struct DefaultExchangeConvention {
    name: String,
}

impl DefaultExchangeConvention {
    pub fn new(kind: ExchangeKind) -> Self {
        Self::named(kind.default_name())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ObservationConvention for DefaultExchangeConvention {
    fn name(&self) -> &str {
        &self.name
    }

    fn low_cardinality_key_values(&self, context: &ExchangeContext) -> KeyValues {
        KeyValues::of([
            uri(context),
            method(context),
            status(context),
            exception(context),
            outcome(context),
        ])
    }

    fn high_cardinality_key_values(&self, context: &ExchangeContext) -> KeyValues {
        KeyValues::of([uri_expanded(context), client_name(context)])
    }
}

/// `uri`: the template, never the expanded path.
pub fn uri(context: &ExchangeContext) -> KeyValue {
    KeyValue::of(keys::URI, context.uri_template().unwrap_or(NONE))
}

/// `method`: the carrier's method name.
pub fn method(context: &ExchangeContext) -> KeyValue {
    match context.carrier() {
        Some(carrier) => KeyValue::of(keys::METHOD, carrier.method.as_str()),
        None => KeyValue::of(keys::METHOD, NONE),
    }
}

/// `status`: numeric code, or a sentinel.
pub fn status(context: &ExchangeContext) -> KeyValue {
    let value = match context.response() {
        Some(response) => match response.status() {
            Ok(code) => code.as_u16().to_string(),
            Err(_) => IO_ERROR.to_string(),
        },
        None => match context.error() {
            Some(err) if err.is_transport_io() => IO_ERROR.to_string(),
            _ => CLIENT_ERROR.to_string(),
        },
    };
    KeyValue::of(keys::STATUS, value)
}

/// `exception`: short type name of the recorded error.
pub fn exception(context: &ExchangeContext) -> KeyValue {
    match context.error() {
        Some(err) => {
            let short = err.short_name();
            let name = if short.trim().is_empty() {
                err.qualified_name()
            } else {
                short
            };
            KeyValue::of(keys::EXCEPTION, name)
        }
        None => KeyValue::of(keys::EXCEPTION, NONE),
    }
}

/// `outcome`: series of the resolved status.
pub fn outcome(context: &ExchangeContext) -> KeyValue {
    let series = context
        .response()
        .and_then(|response| response.status().ok())
        .and_then(series_name);
    KeyValue::of(keys::OUTCOME, series.unwrap_or(UNKNOWN))
}

/// `uri.expanded`: the full request URI.
pub fn uri_expanded(context: &ExchangeContext) -> KeyValue {
    match context.carrier() {
        Some(carrier) => KeyValue::of(keys::URI_EXPANDED, carrier.uri.to_string()),
        None => KeyValue::of(keys::URI_EXPANDED, NONE),
    }
}

/// `client.name`: host of the request URI.
pub fn client_name(context: &ExchangeContext) -> KeyValue {
    let host = context
        .carrier()
        .and_then(|carrier| carrier.uri.host())
        .unwrap_or(NONE);
    KeyValue::of(keys::CLIENT_NAME, host)
}

/// Series name of a status code, if it falls in 1xx-5xx.
pub fn series_name(status: StatusCode) -> Option<&'static str> {
    match status.as_u16() / 100 {
        1 => Some("INFORMATIONAL"),
        2 => Some("SUCCESS"),
        3 => Some("REDIRECTION"),
        4 => Some("CLIENT_ERROR"),
        5 => Some("SERVER_ERROR"),
        _ => None,
    }
}

type LabelFn = Arc<dyn Fn(&ExchangeContext) -> String + Send + Sync>;

/// Convention built from one closure per label.
///
/// Only the labels registered here are produced; the default convention
/// fills in the rest when both are attached to an observation.
///
/// ```
/// use exchange_observation::observation::convention::{keys, FnConvention};
///
/// let convention = FnConvention::named("api.client")
///     .low_cardinality(keys::URI, |ctx| ctx.uri_template().unwrap_or("other").to_string());
/// ```
#[derive(Clone)]
pub struct FnConvention {
    name: String,
    low: Vec<(&'static str, LabelFn)>,
    high: Vec<(&'static str, LabelFn)>,
}

impl FnConvention {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            low: Vec::new(),
            high: Vec::new(),
        }
    }

    pub fn low_cardinality<F>(mut self, key: &'static str, label: F) -> Self
    where
        F: Fn(&ExchangeContext) -> String + Send + Sync + 'static,
    {
        self.low.push((key, Arc::new(label)));
        self
    }

    pub fn high_cardinality<F>(mut self, key: &'static str, label: F) -> Self
    where
        F: Fn(&ExchangeContext) -> String + Send + Sync + 'static,
    {
        self.high.push((key, Arc::new(label)));
        self
    }

    fn evaluate(labels: &[(&'static str, LabelFn)], context: &ExchangeContext) -> KeyValues {
        KeyValues::of(labels.iter().map(|(key, f)| KeyValue::of(*key, f(context))))
    }
}

impl fmt::Debug for FnConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConvention")
            .field("name", &self.name)
            .field("low", &self.low.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .field("high", &self.high.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .finish()
    }
}

impl ObservationConvention for FnConvention {
    fn name(&self) -> &str {
        &self.name
    }

    fn low_cardinality_key_values(&self, context: &ExchangeContext) -> KeyValues {
        Self::evaluate(&self.low, context)
    }

    fn high_cardinality_key_values(&self, context: &ExchangeContext) -> KeyValues {
        Self::evaluate(&self.high, context)
    }
}

/// Labels produced by a custom convention layered over the default.
pub fn resolve_key_values(
    custom: Option<&dyn ObservationConvention>,
    default: &dyn ObservationConvention,
    context: &ExchangeContext,
) -> (KeyValues, KeyValues) {
    let low = default.low_cardinality_key_values(context);
    let high = default.high_cardinality_key_values(context);
    match custom {
        Some(custom) => (
            low.merged_with(custom.low_cardinality_key_values(context)),
            high.merged_with(custom.high_cardinality_key_values(context)),
        ),
        None => (low, high),
    }
}
