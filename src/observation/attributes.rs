//! Exchange-scoped attribute store.
//!
//! # Responsibilities
//! - Carry the observation, its context and the out-of-band terminal error
//!   for the lifetime of one exchange
//! - Provide an atomic create-or-fetch for the observation key
//! - Track whether the exchange is suspended awaiting async completion
//!
//! # Design Decisions
//! - Identity is the store, not the thread: a resumed exchange may run anywhere
//! - Backed by `DashMap`; the entry API makes create-or-fetch atomic per key
//! - Values are typed on read; a key holding another type reads as absent

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::observation::error::{ExchangeError, ObservedError};

/// Key under which the exchange's `Observation` is stored.
pub const OBSERVATION_ATTRIBUTE: &str = "exchange_observation.observation";
/// Key under which the raw `SharedContext` is stored.
pub const CONTEXT_ATTRIBUTE: &str = "exchange_observation.context";
/// Key for a terminal error recorded outside the direct call path.
pub const ERROR_ATTRIBUTE: &str = "exchange_observation.error";
/// Key for the unexpanded URI template.
pub const URI_TEMPLATE_ATTRIBUTE: &str = "exchange_observation.uri_template";

type AttributeValue = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Inner {
    values: DashMap<&'static str, AttributeValue>,
    suspended: AtomicBool,
}

/// Attribute store of one in-flight exchange. Clones share state.
#[derive(Clone, Default)]
pub struct ExchangeAttributes {
    inner: Arc<Inner>,
}

impl ExchangeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value of type `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inner
            .values
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Store a value, replacing any previous one.
    pub fn set<T>(&self, key: &'static str, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.inner.values.insert(key, Arc::new(value));
    }

    /// Fetch the value under `key`, creating it with `create` if absent.
    ///
    /// Atomic with respect to other callers on the same store: of two
    /// concurrent creators, exactly one runs `create` and both see its value.
    /// Returns the value and whether this call created it, or `None` if the
    /// key holds a value of another type.
    pub fn get_or_insert_with<T, F>(&self, key: &'static str, create: F) -> Option<(T, bool)>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut created = false;
        let entry = self.inner.values.entry(key).or_insert_with(|| {
            created = true;
            Arc::new(create())
        });
        let value = entry.value().downcast_ref::<T>().cloned()?;
        Some((value, created))
    }

    /// Record a terminal error raised outside the direct call path.
    /// The first recorded error wins.
    pub fn record_error<E: ExchangeError>(&self, err: &E) {
        self.record_observed_error(err.observed());
    }

    pub fn record_observed_error(&self, err: ObservedError) {
        self.inner
            .values
            .entry(ERROR_ATTRIBUTE)
            .or_insert_with(|| Arc::new(err));
    }

    /// The out-of-band terminal error, if any.
    pub fn terminal_error(&self) -> Option<ObservedError> {
        self.get::<ObservedError>(ERROR_ATTRIBUTE)
    }

    pub fn set_uri_template(&self, template: impl Into<String>) {
        self.set(URI_TEMPLATE_ATTRIBUTE, template.into());
    }

    pub fn uri_template(&self) -> Option<String> {
        self.get::<String>(URI_TEMPLATE_ATTRIBUTE)
    }

    /// Mark the exchange as awaiting asynchronous completion.
    pub fn suspend(&self) {
        self.inner.suspended.store(true, Ordering::SeqCst);
    }

    /// Clear the suspension flag before the exchange re-enters.
    pub fn resume(&self) {
        self.inner.suspended.store(false, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ExchangeAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&'static str> = self.inner.values.iter().map(|entry| *entry.key()).collect();
        f.debug_struct("ExchangeAttributes")
            .field("keys", &keys)
            .field("suspended", &self.is_suspended())
            .finish()
    }
}
