//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the directory API routes and the reporting API in the observation pipeline
//! - Wire up middleware (tracing, panic recovery, observation, timeout, authentication)
//! - Bind to a listener and serve until shutdown is signalled
//!
//! # Design Decisions
//! - `/health` sits outside authentication so liveness checks never need a key
//! - Observation wraps the timeout layer so timed-out requests are still recorded
//! - Panic recovery wraps observation so a recorded panic still becomes a 500

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::audit::{AuditRecorder, AuditTrail};
use crate::config::AppConfig;
use crate::http::correlation::X_CORRELATION_ID;
use crate::http::middleware::{authenticate, observe};
use crate::performance::{AggregationEngine, PerformanceCollector};
use crate::reporting::handlers::get_health;
use crate::reporting::setup_reporting_router;
use crate::security::ApiKeyRegistry;

/// Shared state injected into middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub correlation_header: HeaderName,
    pub audit: AuditRecorder,
    pub audit_trail: AuditTrail,
    pub performance: PerformanceCollector,
    pub aggregation: AggregationEngine,
    pub api_keys: Arc<ApiKeyRegistry>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        audit: AuditRecorder,
        audit_trail: AuditTrail,
        performance: PerformanceCollector,
        aggregation: AggregationEngine,
    ) -> Self {
        let correlation_header = HeaderName::from_bytes(config.audit.correlation_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static(X_CORRELATION_ID));
        let api_keys = Arc::new(ApiKeyRegistry::from_config(&config.auth));
        Self {
            config,
            correlation_header,
            audit,
            audit_trail,
            performance,
            aggregation,
            api_keys,
        }
    }
}

/// HTTP server for the observed directory API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// `app` carries the directory API routes to observe; it may be empty.
    pub fn new(state: AppState, app: Router) -> Self {
        Self {
            router: Self::build_router(state, app),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, app: Router) -> Router {
        let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);

        let api = setup_reporting_router(state.clone())
            .merge(app)
            .layer(from_fn_with_state(state.clone(), authenticate));

        Router::new()
            .merge(api)
            .route("/health", get(get_health))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(from_fn_with_state(state, observe))
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server no longer accepting connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
