//! HTTP control surface tests

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use yeego::{api, events, AppState, EventReceiver, LightController, Registry, Scanner};

mod common;
use common::{found, Behavior, MockConnector, MockDiscoverer};

struct TestApp {
    router: axum::Router,
    connector: MockConnector,
    _scanner: Scanner<MockDiscoverer, MockConnector>,
    _events: EventReceiver,
}

/// Build a test API router over mock lights
async fn build_test_app(connector: MockConnector, ids: &[&str], timeout: Duration) -> TestApp {
    let registry = Registry::new();
    let (tx, rx) = events::channel(64);
    let lights = ids.iter().map(|id| found(id, "lamp")).collect();
    let scanner = Scanner::new(
        MockDiscoverer::new(lights),
        connector.clone(),
        registry.clone(),
        tx,
        Duration::from_millis(10),
        "",
    );
    scanner.initial_scan().await.unwrap();

    let controller = LightController::new(registry, timeout);
    TestApp {
        router: api::router(AppState::new(controller)),
        connector,
        _scanner: scanner,
        _events: rx,
    }
}

async fn get_json(router: &axum::Router, uri: &str) -> Value {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_toggle_endpoint() {
    let app = build_test_app(MockConnector::new(), &["0x1234"], Duration::from_secs(2)).await;

    let json = get_json(&app.router, "/light/0x1234/toggle").await;
    assert_eq!(json, json!({"result": "ok", "id": "0x1234"}));
    assert_eq!(app.connector.device("0x1234").unwrap().request_count(), 1);
}

#[tokio::test]
async fn test_command_on_missing_light() {
    let app = build_test_app(MockConnector::new(), &["0x1234"], Duration::from_secs(2)).await;

    let json = get_json(&app.router, "/light/missing/brightness/50").await;
    assert_eq!(json, json!({"result": "error", "params": ["not found"]}));
}

#[tokio::test]
async fn test_toggle_on_missing_light() {
    let app = build_test_app(MockConnector::new(), &["0x1234"], Duration::from_secs(2)).await;

    let json = get_json(&app.router, "/light/missing/toggle").await;
    assert_eq!(json, json!({"result": "not found"}));
    assert_eq!(app.connector.device("0x1234").unwrap().request_count(), 0);
}

#[tokio::test]
async fn test_brightness_with_duration() {
    let app = build_test_app(MockConnector::new(), &["0x1"], Duration::from_secs(2)).await;

    let json = get_json(&app.router, "/light/0x1/brightness/75?duration=400").await;
    assert_eq!(json, json!({"result": "ok", "id": "0x1"}));

    let requests = app.connector.device("0x1").unwrap().requests();
    assert_eq!(requests[0]["method"], "set_bright");
    assert_eq!(requests[0]["params"], json!([75, "smooth", 400]));
}

#[tokio::test]
async fn test_invalid_brightness_is_rejected_before_sending() {
    let app = build_test_app(MockConnector::new(), &["0x1"], Duration::from_secs(2)).await;

    for uri in ["/light/0x1/brightness/-1", "/light/0x1/brightness/abc"] {
        let json = get_json(&app.router, uri).await;
        assert_eq!(json, json!({"result": "error", "params": ["invalid value"]}));
    }
    assert_eq!(app.connector.device("0x1").unwrap().request_count(), 0);
}

#[tokio::test]
async fn test_unknown_command() {
    let app = build_test_app(MockConnector::new(), &["0x1"], Duration::from_secs(2)).await;

    let json = get_json(&app.router, "/light/0x1/blink/3").await;
    assert_eq!(json, json!({"result": "error", "params": ["invalid command"]}));
}

#[tokio::test]
async fn test_timeout_envelope() {
    let connector = MockConnector::new().with_behavior("0x1", Behavior::Silent);
    let app = build_test_app(connector, &["0x1"], Duration::from_millis(50)).await;

    let json = get_json(&app.router, "/light/0x1/toggle").await;
    assert_eq!(json, json!({"result": "error", "params": ["timeout"]}));
}

#[tokio::test]
async fn test_device_error_envelope() {
    let connector = MockConnector::new().with_behavior(
        "0x1",
        Behavior::ReplyError {
            code: -5000,
            message: "general error".to_string(),
        },
    );
    let app = build_test_app(connector, &["0x1"], Duration::from_secs(2)).await;

    let json = get_json(&app.router, "/light/0x1/setname/Desk").await;
    assert_eq!(
        json,
        json!({"result": "error", "id": "0x1", "error": {"code": -5000, "message": "general error"}})
    );
}

#[tokio::test]
async fn test_list_and_get_lights() {
    let app = build_test_app(MockConnector::new(), &["0xb", "0xa"], Duration::from_secs(2)).await;

    for uri in ["/lights", "/light"] {
        let json = get_json(&app.router, uri).await;
        let lights = json.as_array().unwrap();
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0]["id"], "0xa");
        assert_eq!(lights[1]["id"], "0xb");
    }

    let light = get_json(&app.router, "/light/0xa").await;
    assert_eq!(light["id"], "0xa");
    assert_eq!(light["name"], "lamp");
    assert_eq!(light["model"], "color");
    assert_eq!(light["bright"], 50);
    assert_eq!(light["connected"], true);

    assert_eq!(get_json(&app.router, "/light/missing").await, Value::Null);
}

#[tokio::test]
async fn test_index() {
    let app = build_test_app(MockConnector::new(), &[], Duration::from_secs(2)).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"Yeego");
}
