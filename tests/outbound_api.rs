//! Outbound call API tests
//!
//! Exercise the REST surface in-process with `tower::ServiceExt::oneshot`,
//! pointing the Exotel client at a local stub.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{spawn_exotel_stub, test_config, test_router};

async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Extractor rejections come back as plain text
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = get_json(test_router(test_config()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "exovoice-gateway");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_root_describes_the_api() {
    let (status, json) = get_json(test_router(test_config()), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["endpoints"]["media_stream"], "WS /");
    assert_eq!(json["endpoints"]["outbound_call"], "POST /outbound/call");
    assert_eq!(json["endpoints"]["health"], "GET /health");
    assert_eq!(json["example"]["payload"]["customer_number"], "+91XXXXXXXXXX");
}

#[tokio::test]
async fn test_outbound_rejects_non_e164_number() {
    let (exotel, recorded) = spawn_exotel_stub(200, "{}").await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["detail"],
        "Phone number must be in E.164 format (starting with +)"
    );
    assert!(recorded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_outbound_rejects_disallowed_country_code() {
    let (exotel, recorded) = spawn_exotel_stub(200, "{}").await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");
    config.outbound.allowed_country_codes = vec!["+91".to_string()];

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+14155550100"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Phone number must start with one of: +91");
    assert!(recorded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_outbound_call_success() {
    let (exotel, recorded) = spawn_exotel_stub(
        200,
        r#"{"Call": {"Sid": "CAtest123", "Status": "in-progress"}}"#,
    )
    .await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+919876543210", "custom_field": "support"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(
        json["message"],
        "Outbound call initiated using existing call flow"
    );
    assert_eq!(json["customer_number"], "+919876543210");
    assert_eq!(json["custom_field"], "support");
    assert_eq!(json["flow_type"], "existing_voice_app");
    assert_eq!(json["result"]["Call"]["Sid"], "CAtest123");

    let requests = recorded.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/v1/Accounts/acme/Calls/connect.json");
    assert!(requests[0].body.contains("From=%2B919876543210"));
    assert!(requests[0].body.contains("CallerId=09513886363"));
    assert!(requests[0].body.contains("CallType=trans"));
    assert!(requests[0].body.contains("CustomField=support"));
    assert!(requests[0].body.contains("start_voice"));
    assert!(requests[0].body.contains("TimeOut=30"));
    assert!(requests[0].body.contains("TimeLimit=3600"));
}

#[tokio::test]
async fn test_outbound_custom_field_falls_back_to_default() {
    let (exotel, recorded) = spawn_exotel_stub(200, "{}").await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");
    config.outbound.default_custom_field = Some("campaign-7".to_string());

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["custom_field"], "campaign-7");
    assert!(recorded.lock().unwrap()[0].body.contains("CustomField=campaign-7"));
}

#[tokio::test]
async fn test_outbound_without_custom_field_omits_form_key() {
    let (exotel, recorded) = spawn_exotel_stub(200, "{}").await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["custom_field"].is_null());
    assert!(!recorded.lock().unwrap()[0].body.contains("CustomField"));
}

#[tokio::test]
async fn test_outbound_tolerates_empty_provider_response() {
    let (exotel, _recorded) = spawn_exotel_stub(200, "").await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["status"], "success");
    assert_eq!(
        json["result"]["message"],
        "call initiated (empty provider response)"
    );
}

#[tokio::test]
async fn test_outbound_tolerates_non_json_provider_response() {
    let (exotel, _recorded) = spawn_exotel_stub(200, "OK DONE").await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["status"], "success");
    assert_eq!(json["result"]["raw_response"], "OK DONE");
}

#[tokio::test]
async fn test_outbound_provider_error_maps_to_500() {
    let (exotel, _recorded) = spawn_exotel_stub(
        401,
        r#"{"RestException": {"Message": "Authenticate"}}"#,
    )
    .await;
    let mut config = test_config();
    config.exotel.api_base = format!("http://{exotel}");

    let (status, json) = post_json(
        test_router(config),
        "/outbound/call",
        json!({"customer_number": "+919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.contains("401"), "unexpected detail: {detail}");
}

#[tokio::test]
async fn test_outbound_malformed_body_is_rejected() {
    let (status, _json) = post_json(
        test_router(test_config()),
        "/outbound/call",
        json!({"number": "+919876543210"}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
