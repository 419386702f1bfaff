//! Media stream websocket endpoint
//!
//! The telephony provider dials the service root and streams call audio as
//! JSON text frames. This module owns the pre-session phase: it waits for a
//! `start` event carrying the stream and call ids, then hands the socket to a
//! `CallSession` for the rest of the call.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};

use super::ApiState;
use crate::session::CallSession;
use crate::telephony::StreamEvent;

/// Accept the provider's websocket upgrade
pub fn upgrade(ws: WebSocketUpgrade, state: Arc<ApiState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

/// Read provider frames until a valid `start` opens a session
///
/// At most one session runs per connection. The loop ends when the session
/// returns, the provider stops the stream, or the socket closes. A `start`
/// without both ids drops the connection without a session.
async fn handle_stream(mut socket: WebSocket, state: Arc<ApiState>) {
    tracing::info!("media stream connected");

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "media stream transport error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                tracing::info!("media stream closed before start");
                break;
            }
            _ => continue,
        };

        let event: StreamEvent = match serde_json::from_str(text.as_str()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "malformed stream frame");
                continue;
            }
        };

        match event {
            StreamEvent::Connected => {
                tracing::info!("provider handshake received");
            }
            StreamEvent::Start { stream_sid, start } => {
                let call_sid = start.and_then(|s| s.call_sid);
                let (Some(stream_sid), Some(call_sid)) = (stream_sid, call_sid) else {
                    tracing::error!("start event missing stream or call id, dropping connection");
                    break;
                };

                run_session(socket, &state, stream_sid, call_sid).await;
                return;
            }
            StreamEvent::Stop { stop } => {
                let reason = stop.and_then(|s| s.reason);
                tracing::info!(reason = ?reason, "stream stopped before session start");
                break;
            }
            StreamEvent::Dtmf { dtmf } => {
                tracing::info!(digit = %dtmf.digit, "dtmf before session start");
            }
            StreamEvent::Media { .. } | StreamEvent::Mark { .. } | StreamEvent::Unhandled => {}
        }
    }

    tracing::info!("media stream finished");
}

/// Run one call session to completion, logging the outcome
async fn run_session(socket: WebSocket, state: &ApiState, stream_sid: String, call_sid: String) {
    let session = match CallSession::new(state.config.clone(), stream_sid.clone(), call_sid) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(stream_sid = %stream_sid, error = %e, "failed to build call session");
            return;
        }
    };

    if let Err(e) = session.run(socket).await {
        tracing::error!(stream_sid = %stream_sid, error = %e, "call session ended with error");
    }
}
