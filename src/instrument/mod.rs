//! Instrumentation points.
//!
//! # Data Flow
//! ```text
//! inbound request                          outbound request
//!     → server.rs (tower layer)                → client.rs (hyper-util client)
//!            \                                     /
//!             → instrumentor.rs (create-or-fetch, scope, stop)
//!             → exchange.rs (attribute store, carrier, suspension)
//! ```

pub mod client;
pub mod exchange;
pub mod instrumentor;
pub mod server;

pub use client::ObservedClient;
pub use exchange::{Exchange, ExchangeHandle, UriTemplate};
pub use instrumentor::ExchangeInstrumentor;
pub use server::{ServerObservationLayer, ServerObservationService};
