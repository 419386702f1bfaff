//! Service status and usage endpoints

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "exovoice-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Usage payload for plain GET requests to the service root
#[derive(Serialize)]
pub struct UsageResponse {
    pub service: &'static str,
    pub description: &'static str,
    pub endpoints: EndpointList,
    pub example: UsageExample,
}

/// Endpoint index inside the usage payload
#[derive(Serialize)]
pub struct EndpointList {
    pub media_stream: &'static str,
    pub outbound_call: &'static str,
    pub health: &'static str,
}

/// Example outbound request in the usage payload
#[derive(Serialize)]
pub struct UsageExample {
    pub url: &'static str,
    pub payload: ExamplePayload,
}

#[derive(Serialize)]
pub struct ExamplePayload {
    pub customer_number: &'static str,
    pub custom_field: &'static str,
}

/// Describe the service and its endpoints
pub fn usage() -> Json<UsageResponse> {
    Json(UsageResponse {
        service: "exovoice-gateway",
        description: "Realtime voice AI over Exotel media streams; outbound calls connect through an existing voice app",
        endpoints: EndpointList {
            media_stream: "WS /",
            outbound_call: "POST /outbound/call",
            health: "GET /health",
        },
        example: UsageExample {
            url: "POST /outbound/call",
            payload: ExamplePayload {
                customer_number: "+91XXXXXXXXXX",
                custom_field: "customer_support",
            },
        },
    })
}

/// Build health router (no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}
