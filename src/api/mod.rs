//! HTTP and websocket surface for the gateway
//!
//! One axum application serves three things on a single port: the REST
//! endpoint that triggers outbound calls, a pair of informational GET
//! endpoints, and the websocket the telephony provider dials to stream
//! call audio. The provider connects to the service root, so `GET /`
//! routes on the `Upgrade` header.

pub mod health;
pub mod outbound;
pub mod stream;

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::telephony::ExotelClient;
use crate::{Config, Result};

/// Shared state for API handlers
pub struct ApiState {
    /// Gateway configuration
    pub config: Arc<Config>,
    /// REST client for the telephony provider
    pub exotel: Arc<ExotelClient>,
}

impl ApiState {
    /// Build the shared state from a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the Exotel credentials are incomplete
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let exotel = Arc::new(ExotelClient::new(
            config.exotel.clone(),
            config.outbound.clone(),
        )?);
        Ok(Self { config, exotel })
    }
}

/// The gateway HTTP server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    /// Create a server from a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the Exotel credentials are incomplete
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let host = config.server.host.clone();
        let port = config.server.port;
        let state = Arc::new(ApiState::new(config)?);
        Ok(Self { state, host, port })
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        Self::build_router(self.state.clone())
    }

    /// Assemble routes around a shared state
    pub fn build_router(state: Arc<ApiState>) -> Router {
        // CORS layer for cross-origin requests from dashboards
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(index))
            .with_state(state.clone())
            .merge(outbound::router(state))
            .merge(health::router())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %addr, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Service root: media stream upgrade for the provider, info payload for
/// plain GET requests
async fn index(
    State(state): State<Arc<ApiState>>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(upgrade) => stream::upgrade(upgrade, state),
        Err(_) => health::usage().into_response(),
    }
}
