//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, TraceLayer)
//!     → ServerObservationLayer (route_layer, one server observation per request)
//!     → handler
//!         → /upstream/*: ObservedClient (one client observation per forward)
//!     → Send to client
//! ```

pub mod server;

pub use server::{shutdown_signal, HttpServer};
