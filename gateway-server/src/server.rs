// gateway-server/src/server.rs
// ============================================================================
// Module: Gateway HTTP Server
// Description: Builds the axum router and runs it to completion.
// Purpose: One type the CLI crate hands a bound `AppState` and an address.
// Dependencies: axum, tokio, tower-http
// ============================================================================

//! ## Overview
//! [`GatewayServer::router`] wires every handler named in spec.md §6 onto
//! one [`axum::Router`]; [`GatewayServer::serve`] binds and runs it until the
//! process is asked to shut down. The DLQ and execution-log routes carry
//! [`crate::auth::control_surface_guard`] as a `route_layer`; the inbound
//! proxy and test-notification routes do not, since the inbound proxy
//! authenticates per-integration via `inbound_auth` instead.

use std::net::SocketAddr;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::control_surface_guard;
use crate::handlers;
use crate::state::AppState;

/// Body size cap applied when the caller does not specify one explicitly.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Errors raised building or running the HTTP server.
#[derive(Debug, Error)]
pub enum GatewayServerError {
    /// The configured bind address could not be parsed.
    #[error("invalid bind address {0}: {1}")]
    InvalidAddr(String, std::net::AddrParseError),
    /// Binding the listening socket failed.
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    /// The server loop exited with an I/O error.
    #[error("server loop failed: {0}")]
    Serve(std::io::Error),
}

/// Builds and serves the gateway's HTTP surface.
pub struct GatewayServer {
    state: AppState,
    max_body_bytes: usize,
}

impl GatewayServer {
    /// Wraps application state in a server ready to build a router or bind.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state, max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }

    /// Overrides the inbound request body size cap.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Builds the axum router without binding a socket; useful for tests
    /// that drive the router in-process.
    #[must_use]
    pub fn router(&self) -> Router {
        let control_surface = Router::new()
            .route("/dlq", get(handlers::dlq::list))
            .route("/dlq/stats", get(handlers::dlq::stats))
            .route("/dlq/{dlqId}", get(handlers::dlq::get).delete(handlers::dlq::delete))
            .route("/dlq/{dlqId}/retry", post(handlers::dlq::retry))
            .route("/dlq/{dlqId}/abandon", post(handlers::dlq::abandon))
            .route("/execution-logs", get(handlers::logs::list))
            .route("/execution-logs/{traceId}/timeline", get(handlers::logs::timeline))
            .route_layer(middleware::from_fn_with_state(self.state.clone(), control_surface_guard));

        Router::new()
            .route("/health", get(handlers::health::health))
            .route("/api/v1/integrations/{type}", post(handlers::inbound::proxy_inbound))
            .route("/api/v1/events/test-notification-queue", post(handlers::events::test_notification))
            .merge(control_surface)
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(self.max_body_bytes))
            .with_state(self.state.clone())
    }

    /// Binds `bind_addr` and serves the router until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayServerError`] if `bind_addr` cannot be parsed, the
    /// socket cannot be bound, or the serve loop itself fails.
    pub async fn serve(&self, bind_addr: &str) -> Result<(), GatewayServerError> {
        let addr: SocketAddr = bind_addr.parse().map_err(|err| GatewayServerError::InvalidAddr(bind_addr.to_string(), err))?;
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| GatewayServerError::Bind(addr, err))?;
        tracing::info!(%addr, "gateway server listening");
        axum::serve(listener, self.router()).await.map_err(GatewayServerError::Serve)
    }
}
