//! Shared test utilities
//!
//! Builds gateway instances wired to stub speech and telephony providers on
//! ephemeral local ports, plus a provider-side websocket client for driving
//! the media stream.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message as ServerMessage, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::routing::{get, post};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as ClientMessage;

use exovoice_gateway::Config;
use exovoice_gateway::api::{ApiServer, ApiState};
use exovoice_gateway::config::{
    ExotelConfig, LlmConfig, OutboundConfig, ServerConfig, SessionConfig, SpeechConfig, TtsConfig,
};

/// One request captured by a stub provider
pub struct RecordedRequest {
    pub path: String,
    pub body: String,
}

/// Requests captured by a stub provider, in arrival order
pub type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// Gateway configuration pointing at unreachable providers.
/// Tests route the services they exercise to local stubs.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        exotel: ExotelConfig {
            api_key: SecretString::from("test-key"),
            api_token: SecretString::from("test-token"),
            account_sid: "acme".to_string(),
            caller_id: "09513886363".to_string(),
            app_id: "12345".to_string(),
            subdomain: "api.exotel.com".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
        },
        outbound: OutboundConfig {
            require_e164: true,
            allowed_country_codes: Vec::new(),
            default_custom_field: None,
            ring_timeout_secs: 30,
            time_limit_secs: 3600,
        },
        session: SessionConfig {
            sample_rate: 8000,
            enable_interruptions: true,
            greeting: "Hello! How can I help you today?".to_string(),
            system_prompt: "You are a helpful voice assistant.".to_string(),
        },
        speech: SpeechConfig {
            api_key: SecretString::from("dg-test"),
            url: "ws://127.0.0.1:9/v1/listen".to_string(),
            model: "nova-2".to_string(),
            language: "en".to_string(),
            vad_enabled: true,
            utterance_end_ms: 1000,
            endpointing_ms: 300,
        },
        llm: LlmConfig {
            api_key: SecretString::from("oa-test"),
            url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        },
        tts: TtsConfig {
            api_key: SecretString::from("ca-test"),
            url: "http://127.0.0.1:9".to_string(),
            model: "sonic-2".to_string(),
            voice_id: "test-voice".to_string(),
            version: "2024-06-10".to_string(),
        },
    }
}

/// Build the gateway router for in-process request tests
pub fn test_router(config: Config) -> Router {
    let state = Arc::new(ApiState::new(Arc::new(config)).expect("failed to build api state"));
    ApiServer::build_router(state)
}

/// Start the gateway on an ephemeral port
pub async fn spawn_app(config: Config) -> SocketAddr {
    serve_on_ephemeral(test_router(config)).await
}

async fn serve_on_ephemeral(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });

    addr
}

/// Stub Exotel Calls API answering every request with a fixed response
pub async fn spawn_exotel_stub(status: u16, body: &'static str) -> (SocketAddr, Recorded) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&recorded);

    let app = Router::new().fallback(move |request: axum::extract::Request| {
        let seen = Arc::clone(&seen);
        async move {
            let path = request.uri().path().to_string();
            let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
                .await
                .unwrap_or_default();
            seen.lock().unwrap().push(RecordedRequest {
                path,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
            (StatusCode::from_u16(status).expect("stub status"), body)
        }
    });

    (serve_on_ephemeral(app).await, recorded)
}

/// Stub OpenAI chat completion endpoint returning a fixed reply
pub async fn spawn_openai_stub(reply: &'static str) -> (SocketAddr, Recorded) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&recorded);

    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |body: String| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(RecordedRequest {
                    path: "/v1/chat/completions".to_string(),
                    body,
                });
                axum::Json(serde_json::json!({
                    "id": "chatcmpl-test",
                    "object": "chat.completion",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": reply},
                        "finish_reason": "stop"
                    }]
                }))
            }
        }),
    );

    (serve_on_ephemeral(app).await, recorded)
}

/// Stub Cartesia synthesis endpoint returning fixed PCM bytes
pub async fn spawn_cartesia_stub(pcm: Vec<u8>) -> (SocketAddr, Recorded) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&recorded);

    let app = Router::new().route(
        "/tts/bytes",
        post(move |body: String| {
            let seen = Arc::clone(&seen);
            let pcm = pcm.clone();
            async move {
                seen.lock().unwrap().push(RecordedRequest {
                    path: "/tts/bytes".to_string(),
                    body,
                });
                pcm
            }
        }),
    );

    (serve_on_ephemeral(app).await, recorded)
}

/// Stub Deepgram live endpoint. Sends the scripted messages once the first
/// audio frame arrives, then keeps reading until the client goes away.
pub async fn spawn_deepgram_stub(on_first_audio: Vec<String>) -> SocketAddr {
    let app = Router::new().route(
        "/v1/listen",
        get(move |ws: WebSocketUpgrade| {
            let script = on_first_audio.clone();
            async move { ws.on_upgrade(move |socket| deepgram_session(socket, script)) }
        }),
    );

    serve_on_ephemeral(app).await
}

async fn deepgram_session(mut socket: WebSocket, script: Vec<String>) {
    let mut scripted = false;
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            ServerMessage::Binary(_) if !scripted => {
                scripted = true;
                for line in &script {
                    if socket
                        .send(ServerMessage::Text(line.clone().into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            ServerMessage::Close(_) => return,
            _ => {}
        }
    }
}

/// Deepgram-shaped final transcript closing a turn
pub fn final_transcript(text: &str) -> String {
    serde_json::json!({
        "type": "Results",
        "channel_index": [0, 1],
        "is_final": true,
        "speech_final": true,
        "channel": {"alternatives": [{"transcript": text, "confidence": 0.99}]}
    })
    .to_string()
}

/// Deepgram-shaped speech-started event
pub fn speech_started() -> String {
    serde_json::json!({"type": "SpeechStarted", "channel": [0], "timestamp": 0.5}).to_string()
}

/// Provider-side websocket client
pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Dial the gateway's media stream endpoint
pub async fn connect_stream(addr: SocketAddr) -> WsClient {
    let (ws, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .expect("failed to connect media stream");
    ws
}

/// Send one JSON text frame
pub async fn send_frame(ws: &mut WsClient, frame: &serde_json::Value) {
    ws.send(ClientMessage::Text(frame.to_string().into()))
        .await
        .expect("failed to send frame");
}

/// Receive the next JSON text frame. `None` once the connection is gone.
pub async fn recv_frame(ws: &mut WsClient) -> Option<serde_json::Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")?;
        match frame {
            Ok(ClientMessage::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).expect("frame is not JSON"));
            }
            Ok(ClientMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Wait until the gateway drops the connection, skipping leftover frames
pub async fn expect_closed(ws: &mut WsClient) {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close")
        {
            None | Some(Ok(ClientMessage::Close(_)) | Err(_)) => return,
            Some(Ok(_)) => {}
        }
    }
}

/// Provider `start` frame announcing the stream
pub fn start_frame(stream_sid: &str, call_sid: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "start",
        "sequence_number": "1",
        "stream_sid": stream_sid,
        "start": {
            "call_sid": call_sid,
            "account_sid": "acme",
            "from": "+919876543210",
            "to": "09513886363",
            "media_format": {"encoding": "raw", "sample_rate": "8000"}
        }
    })
}

/// Provider `media` frame carrying caller PCM
pub fn media_frame(pcm: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "event": "media",
        "media": {
            "payload": base64::engine::general_purpose::STANDARD.encode(pcm),
            "chunk": 1,
            "timestamp": "120"
        }
    })
}

/// Provider `stop` frame ending the stream
pub fn stop_frame(reason: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "stop",
        "stop": {"call_sid": "test-call", "reason": reason}
    })
}
