//! HTTP exchange observation.
//!
//! Wraps each HTTP exchange (client or server side) in exactly one
//! observation that is timed, labelled and emitted once.
//!
//! # Architecture Overview
//!
//! ```text
//!   inbound request                                   outbound request
//!         │                                                  │
//!         ▼                                                  ▼
//!  ┌──────────────────────┐                      ┌──────────────────────┐
//!  │ ServerObservationLayer│                      │    ObservedClient    │
//!  └──────────┬───────────┘                      └──────────┬───────────┘
//!             └────────────────┐            ┌───────────────┘
//!                              ▼            ▼
//!                      ┌──────────────────────────┐
//!                      │   ExchangeInstrumentor   │  create-or-fetch, scope,
//!                      │                          │  error capture, stop
//!                      └────────────┬─────────────┘
//!                                   ▼
//!                      ┌──────────────────────────┐
//!                      │ Observation + Convention │  context → labels
//!                      └────────────┬─────────────┘
//!                                   ▼
//!                      ┌──────────────────────────┐
//!                      │   ObservationRegistry    │  MetricsSink, TracingSink
//!                      └──────────────────────────┘
//! ```

// Core
pub mod instrument;
pub mod observation;

// Host integration
pub mod config;
pub mod http;
pub mod observability;

pub use config::ObservationConfig;
pub use http::HttpServer;
pub use instrument::{ExchangeInstrumentor, ObservedClient, ServerObservationLayer};
pub use observation::{
    ExchangeContext, Observation, ObservationConvention, ObservationRegistry, ObservedError,
};
