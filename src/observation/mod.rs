//! Observation core.
//!
//! # Data Flow
//! ```text
//! exchange arrives
//!     → context.rs (carrier, response, template, first error)
//!     → handle.rs (Observation: start / scope / error / stop)
//!     → convention.rs (context → low + high cardinality labels)
//!     → registry.rs (ObservationEvent → sinks)
//!
//! attributes.rs ties an Observation to its exchange so a
//! re-entrant call finds the same one.
//! ```
//!
//! # Design Decisions
//! - Low-cardinality labels feed metrics; high-cardinality labels feed traces only
//! - Stop is idempotent; extraction and emission happen once
//! - Missing data yields sentinel label values, never missing labels

pub mod attributes;
pub mod context;
pub mod convention;
pub mod error;
pub mod handle;
pub mod registry;

pub use attributes::ExchangeAttributes;
pub use context::{ExchangeContext, RequestHead, ResponseStatus, SharedContext};
pub use convention::{
    DefaultExchangeConvention, ExchangeKind, FnConvention, KeyValue, KeyValues, ObservationConvention,
};
pub use error::{ExchangeError, ObservedError, StatusReadError};
pub use handle::{Observation, ObservationScope, ObservationState};
pub use registry::{ObservationEvent, ObservationRegistry, ObservationSink, RecordingSink};
