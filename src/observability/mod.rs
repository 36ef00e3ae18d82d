//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ObservationConfig
//!     → registry_from_config()
//!         → metrics.rs  (MetricsSink: histogram per observation name)
//!         → tracing.rs  (TracingSink: one log event per observation)
//!     → instrumentor() (default convention named from config)
//!
//! Process-wide setup:
//!     → logging.rs (subscriber, filter, format)
//!     → metrics.rs (Prometheus scrape endpoint)
//! ```

pub mod logging;
pub mod metrics;
pub mod tracing;

use std::sync::Arc;

use crate::config::schema::ObservationConfig;
use crate::instrument::instrumentor::ExchangeInstrumentor;
use crate::observation::convention::{DefaultExchangeConvention, ExchangeKind};
use crate::observation::registry::ObservationRegistry;

pub use self::logging::init_logging;
pub use self::metrics::{init_metrics, MetricsSink};
pub use self::tracing::TracingSink;

/// Registry holding the sinks `config` enables.
pub fn registry_from_config(config: &ObservationConfig) -> ObservationRegistry {
    let mut registry = ObservationRegistry::new();
    if !config.enabled {
        return registry;
    }
    if config.metrics.enabled {
        registry = registry.with_sink(Arc::new(MetricsSink::new()));
    }
    if config.logging.log_observations {
        registry = registry.with_sink(Arc::new(TracingSink::new()));
    }
    registry
}

/// Instrumentor for `kind` whose default convention uses the configured name.
pub fn instrumentor(
    kind: ExchangeKind,
    config: &ObservationConfig,
    registry: ObservationRegistry,
) -> ExchangeInstrumentor {
    let name = match kind {
        ExchangeKind::Client => &config.conventions.client_name,
        ExchangeKind::Server => &config.conventions.server_name,
    };
    ExchangeInstrumentor::new(kind, registry)
        .with_default_convention(Arc::new(DefaultExchangeConvention::named(name.clone())))
}
