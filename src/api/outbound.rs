//! Outbound call endpoint
//!
//! Validates the destination number at the boundary, then hands off to the
//! Exotel client. Rejected requests never reach the provider.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ApiState;

/// Build outbound call router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/outbound/call", post(trigger_call))
        .with_state(state)
}

/// Outbound call request body
#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    pub customer_number: String,
    #[serde(default)]
    pub custom_field: Option<String>,
}

/// Outbound call success response
#[derive(Debug, Serialize)]
pub struct OutboundCallResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub customer_number: String,
    pub custom_field: Option<String>,
    pub flow_type: &'static str,
    pub result: serde_json::Value,
}

/// Trigger an outbound call through the pre-existing voice app
async fn trigger_call(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<OutboundCallRequest>,
) -> Result<Json<OutboundCallResponse>, OutboundError> {
    let outbound = &state.config.outbound;

    outbound
        .validate_number(&request.customer_number)
        .map_err(OutboundError::BadRequest)?;

    let custom_field = request
        .custom_field
        .clone()
        .or_else(|| outbound.default_custom_field.clone());

    tracing::info!(number = %request.customer_number, "outbound call requested");

    let result = state
        .exotel
        .connect_call(&request.customer_number, custom_field.as_deref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "outbound call failed");
            OutboundError::TriggerFailed(e.to_string())
        })?;

    Ok(Json(OutboundCallResponse {
        status: "success",
        message: "Outbound call initiated using existing call flow",
        customer_number: request.customer_number,
        custom_field,
        flow_type: "existing_voice_app",
        result,
    }))
}

/// Outbound API errors
#[derive(Debug)]
pub enum OutboundError {
    BadRequest(String),
    TriggerFailed(String),
}

impl IntoResponse for OutboundError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            detail: String,
        }

        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::TriggerFailed(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
