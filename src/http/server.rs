//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router for the demo host
//! - Observe every matched route with `ServerObservationLayer`
//! - Forward `/upstream/*` through an `ObservedClient`
//! - Bind server to listener and shut down gracefully

use std::future::Future;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ObservationConfig;
use crate::instrument::{ObservedClient, ServerObservationLayer};
use crate::observability;
use crate::observation::convention::ExchangeKind;
use crate::observation::error::{ExchangeError, ObservedError};
use crate::observation::registry::ObservationRegistry;

/// Template used to label forwarded requests on the client side.
pub const UPSTREAM_TEMPLATE: &str = "/{*path}";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: ObservedClient,
    pub upstream: Option<String>,
}

/// Demo host serving observed routes.
pub struct HttpServer {
    router: Router,
    config: ObservationConfig,
}

impl HttpServer {
    /// Create a server whose sinks are built from `config`.
    pub fn new(config: ObservationConfig) -> Self {
        let registry = observability::registry_from_config(&config);
        Self::with_registry(config, registry)
    }

    /// Create a server reporting to `registry`.
    pub fn with_registry(config: ObservationConfig, registry: ObservationRegistry) -> Self {
        let client = ObservedClient::with_instrumentor(observability::instrumentor(
            ExchangeKind::Client,
            &config,
            registry.clone(),
        ));
        let state = AppState {
            client,
            upstream: config.server.upstream_address.clone(),
        };
        let router = Self::build_router(&config, registry, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The timeout sits inside the observation so a timed-out request is
    /// still observed as a 408.
    #[allow(deprecated)]
    fn build_router(
        config: &ObservationConfig,
        registry: ObservationRegistry,
        state: AppState,
    ) -> Router {
        let observation = ServerObservationLayer::with_instrumentor(observability::instrumentor(
            ExchangeKind::Server,
            config,
            registry,
        ));

        let mut router = Router::new()
            .route("/resource/{id}", get(resource_handler))
            .route("/fail", get(fail_handler));
        if state.upstream.is_some() {
            router = router.route("/upstream/{*path}", any(forward_handler));
        }

        router
            .with_state(state)
            .route_layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .route_layer(observation)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for serving elsewhere or driving with `tower::ServiceExt`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ObservationConfig {
        &self.config
    }

    /// Run the server until `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn resource_handler(Path(id): Path<String>) -> impl IntoResponse {
    tracing::debug!(id = %id, "Serving resource");
    format!("resource {id}")
}

/// Always fails, reporting the cause through the response extensions.
async fn fail_handler() -> Response {
    let err = std::io::Error::other("simulated failure");
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, "simulated failure").into_response();
    response.extensions_mut().insert(ObservedError::capture(&err));
    response
}

async fn forward_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Response {
    let Some(upstream) = state.upstream.as_deref() else {
        return (StatusCode::NOT_FOUND, "No upstream configured").into_response();
    };

    let (parts, body) = request.into_parts();
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("/{path}?{query}"),
        None => format!("/{path}"),
    };
    let uri = match Uri::builder()
        .scheme("http")
        .authority(upstream)
        .path_and_query(path_and_query)
        .build()
    {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid upstream URI");
            return (StatusCode::BAD_REQUEST, "Invalid upstream URI").into_response();
        }
    };

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method;
    *outbound.uri_mut() = uri;
    *outbound.headers_mut() = parts.headers;

    match state.client.request_templated(UPSTREAM_TEMPLATE, outbound).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(error = %e, "Upstream error");
            let mut response = (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
            response.extensions_mut().insert(e.observed());
            response
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutdown signal received");
}
