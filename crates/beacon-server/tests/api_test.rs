//! HTTP control API tests driven through the router.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use beacon_core::ConnectionMeta;
use beacon_server::config::Config;
use beacon_server::{router, AppState};
use beacon_transport::{HubSession, Outbound};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn app(config: Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config));
    (router(state.clone()), state)
}

async fn register(state: &AppState, user_id: &str) -> (Arc<HubSession>, mpsc::Receiver<Outbound>) {
    let (session, rx) = HubSession::new(state.hub.clone(), 16);
    state
        .roster
        .register(user_id, session.clone(), ConnectionMeta::new(user_id, "teacher"))
        .await
        .unwrap();
    (session, rx)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn payload_json(item: Outbound) -> Value {
    match item {
        Outbound::Payload(bytes) => serde_json::from_slice(&bytes).unwrap(),
        Outbound::Close => panic!("unexpected close"),
    }
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app(Config::default());
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_join_requires_connection() {
    let (app, state) = app(Config::default());

    let (status, body) = call(&app, Method::POST, "/api/rooms/room1/members/ghost", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NOT_CONNECTED");
    assert!(state.roster.list_rooms().is_empty());
}

#[tokio::test]
async fn test_membership_endpoints() {
    let (app, state) = app(Config::default());
    let _u1 = register(&state, "u1").await;
    let _u2 = register(&state, "u2").await;

    let (status, body) = call(&app, Method::POST, "/api/rooms/room1/members/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let (_, body) = call(&app, Method::POST, "/api/rooms/room1/members/u1", None).await;
    assert_eq!(body["changed"], false);
    call(&app, Method::POST, "/api/rooms/room1/members/u2", None).await;

    let (status, body) = call(&app, Method::GET, "/api/rooms/room1/members", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"], json!(["u1", "u2"]));

    let (status, body) = call(&app, Method::GET, "/api/rooms/nowhere/members", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (_, body) = call(&app, Method::GET, "/api/rooms", None).await;
    assert_eq!(body, json!({"room1": ["u1", "u2"]}));

    let (_, body) = call(&app, Method::GET, "/api/presence/u1", None).await;
    assert_eq!(body, json!({"user_id": "u1", "online": true, "rooms": ["room1"]}));

    let (status, body) = call(&app, Method::DELETE, "/api/rooms/room1/members/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let (_, body) = call(&app, Method::DELETE, "/api/rooms/room1/members/u1", None).await;
    assert_eq!(body["changed"], false);

    let (_, body) = call(&app, Method::GET, "/api/presence/ghost", None).await;
    assert_eq!(body["online"], false);

    let (_, body) = call(&app, Method::GET, "/api/stats", None).await;
    assert_eq!(body["strategy"], "direct");
    assert_eq!(body["roster"], json!({"connections": 2, "rooms": 1, "memberships": 1}));
}

#[tokio::test]
async fn test_room_limit_maps_to_429() {
    let mut config = Config::default();
    config.limits.max_rooms_per_connection = 1;
    let (app, state) = app(config);
    let _u1 = register(&state, "u1").await;

    call(&app, Method::POST, "/api/rooms/a/members/u1", None).await;
    let (status, body) = call(&app, Method::POST, "/api/rooms/b/members/u1", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "ROOM_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_broadcast_endpoints() {
    let (app, state) = app(Config::default());
    let (_s1, mut rx1) = register(&state, "u1").await;
    let (_s2, mut rx2) = register(&state, "u2").await;
    state.roster.join("u1", "room1").unwrap();
    state.roster.join("u2", "room1").unwrap();

    let (status, report) = call(
        &app,
        Method::POST,
        "/api/rooms/room1/broadcast",
        Some(json!({"type": "chat", "body": {"text": "hi"}, "exclude": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["delivered"], 1);
    assert_eq!(report["excluded"], 1);
    assert_eq!(payload_json(rx2.recv().await.unwrap())["body"]["text"], "hi");
    assert!(rx1.try_recv().is_err());

    let (_, report) = call(
        &app,
        Method::POST,
        "/api/broadcast",
        Some(json!({"type": "announcement", "body": "closing early"})),
    )
    .await;
    assert_eq!(report["delivered"], 2);
    assert_eq!(payload_json(rx1.recv().await.unwrap())["type"], "announcement");
    assert_eq!(payload_json(rx2.recv().await.unwrap())["type"], "announcement");

    let (_, body) = call(
        &app,
        Method::POST,
        "/api/users/u1/send",
        Some(json!({"type": "notification", "body": {"id": 9}})),
    )
    .await;
    assert_eq!(body["status"], "sent");
    assert_eq!(payload_json(rx1.recv().await.unwrap())["body"]["id"], 9);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/users/u9/send",
        Some(json!({"type": "notification", "body": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");
}

#[tokio::test]
async fn test_presence_lists_connections() {
    let (app, state) = app(Config::default());
    let _u2 = register(&state, "u2").await;
    let _u1 = register(&state, "u1").await;

    let (_, body) = call(&app, Method::GET, "/api/presence", None).await;
    let users: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["user_id"].as_str().unwrap())
        .collect();
    assert_eq!(users, vec!["u1", "u2"]);
    assert_eq!(body[0]["role"], "teacher");
}
