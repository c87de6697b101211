//! HTTP API tests over the in-memory stack.
//!
//! Drives the full router with `tower::ServiceExt::oneshot` against the
//! in-memory record store, the real topic broadcaster, and the real push
//! dispatcher over a scripted gateway — the whole engine minus Postgres
//! and a live push service.
//!
//! Run with: `cargo test -p cliniq-server --test api_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use cliniq_core::{Clock, QueueService};
use cliniq_push::subscription::SubscriptionStore;
use cliniq_push::{PushDispatcher, PushGateway, Subscription, SubscriptionKeys};
use cliniq_server::{build_router, AppState};
use cliniq_testing::{
    test_clock, InMemoryRecordStore, InMemorySubscriptionStore, ScriptedOutcome,
    ScriptedPushGateway,
};
use cliniq_web::TopicBroadcaster;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    broadcaster: TopicBroadcaster,
    subscriptions: Arc<InMemorySubscriptionStore>,
    gateway: Arc<ScriptedPushGateway>,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryRecordStore::new());
    let broadcaster = TopicBroadcaster::new();
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let clock = Arc::new(test_clock());

    let subscriptions_dyn: Arc<dyn SubscriptionStore> = subscriptions.clone();
    let gateway_dyn: Arc<dyn PushGateway> = gateway.clone();
    let clock_dyn: Arc<dyn Clock> = clock.clone();

    let dispatcher = Arc::new(PushDispatcher::new(
        subscriptions_dyn.clone(),
        gateway_dyn,
        clock_dyn.clone(),
    ));
    let service = Arc::new(QueueService::new(
        store,
        Arc::new(broadcaster.clone()),
        dispatcher,
        clock_dyn.clone(),
    ));
    let state = AppState::new(
        service,
        broadcaster.clone(),
        subscriptions_dyn,
        clock_dyn,
    );

    TestApp {
        router: build_router(state),
        broadcaster,
        subscriptions,
        gateway,
    }
}

fn request(method: &str, uri: &str, account: Option<Uuid>, role: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(account) = account {
        builder = builder.header("X-Account-Id", account.to_string());
    }
    if let Some(role) = role {
        builder = builder.header("X-Caller-Role", role);
    }
    match body {
        Some(value) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn book(app: &TestApp, doctor: Uuid, account: Uuid) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("/api/queues/{doctor}/tickets"),
            Some(account),
            None,
            Some(json!({"reason": "checkup"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "booking failed: {body}");
    body
}

async fn advance(app: &TestApp, doctor: Uuid, staff: Uuid) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            &format!("/api/queues/{doctor}/advance"),
            Some(staff),
            Some("staff"),
            Some(json!({})),
        ),
    )
    .await
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = test_app();
    let (status, _) = send(&app, request("GET", "/health", None, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request("GET", "/ready", None, None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn booking_returns_created_ticket() {
    let app = test_app();
    let doctor = Uuid::new_v4();

    let body = book(&app, doctor, Uuid::new_v4()).await;
    assert_eq!(body["number"], 1);
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["doctor_id"], doctor.to_string());

    let body = book(&app, doctor, Uuid::new_v4()).await;
    assert_eq!(body["number"], 2);
}

#[tokio::test]
async fn booking_requires_identity() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/queues/{doctor}/tickets"),
            None,
            None,
            Some(json!({"reason": "checkup"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_rejects_empty_reason() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/queues/{doctor}/tickets"),
            Some(Uuid::new_v4()),
            None,
            Some(json!({"reason": "  "})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}

#[tokio::test]
async fn advance_requires_staff_role() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    book(&app, doctor, Uuid::new_v4()).await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/queues/{doctor}/advance"),
            Some(Uuid::new_v4()),
            None,
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn advance_on_empty_day_is_not_found() {
    let app = test_app();
    let (status, body) = advance(&app, Uuid::new_v4(), Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
}

#[tokio::test]
async fn advance_past_end_reports_queue_exhausted() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let staff = Uuid::new_v4();
    book(&app, doctor, Uuid::new_v4()).await;

    let (status, body) = advance(&app, doctor, staff).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_number"], 1);
    assert_eq!(body["serving"]["number"], 1);

    let (status, body) = advance(&app, doctor, staff).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "QUEUE_EXHAUSTED");
}

#[tokio::test]
async fn mark_then_remark_conflicts() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let staff = Uuid::new_v4();
    let ticket = book(&app, doctor, Uuid::new_v4()).await;
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/tickets/{ticket_id}/status"),
            Some(staff),
            Some("staff"),
            Some(json!({"disposition": "completed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/tickets/{ticket_id}/status"),
            Some(staff),
            Some("staff"),
            Some(json!({"disposition": "missed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancel_is_holder_or_staff_only() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let holder = Uuid::new_v4();
    let ticket = book(&app, doctor, holder).await;
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(
            "DELETE",
            &format!("/api/tickets/{ticket_id}"),
            Some(Uuid::new_v4()),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(
            "DELETE",
            &format!("/api/tickets/{ticket_id}"),
            Some(holder),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn status_of_empty_day_is_idle() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/queues/{doctor}/status"),
            Some(Uuid::new_v4()),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["state"], "idle");
    assert_eq!(body["current_number"], 0);
    assert_eq!(body["last_assigned"], 0);
    assert!(body["your_ticket"].is_null());
}

#[tokio::test]
async fn status_shows_own_ticket_and_ahead_count() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let me = Uuid::new_v4();

    book(&app, doctor, Uuid::new_v4()).await;
    book(&app, doctor, Uuid::new_v4()).await;
    book(&app, doctor, me).await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/queues/{doctor}/status"),
            Some(me),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["your_ticket"]["number"], 3);
    assert_eq!(body["tickets_ahead"], 2);
}

#[tokio::test]
async fn push_registration_and_delivery_on_advance() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let holder = Uuid::new_v4();

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/api/push/subscriptions",
            Some(holder),
            None,
            Some(json!({
                "endpoint": "https://push.example/device-1",
                "keys": {"p256dh": "BKey", "auth": "secret"}
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    book(&app, doctor, holder).await;
    let (status, _) = advance(&app, doctor, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::OK);

    // Push dispatch is detached; give the spawned task a chance to run.
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    let deliveries = app.gateway.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "https://push.example/device-1");
    let payload: Value = serde_json::from_slice(&deliveries[0].1).unwrap();
    assert_eq!(payload["kind"], "now-serving");
}

#[tokio::test]
async fn dead_endpoint_is_retired_during_advance_dispatch() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let holder = Uuid::new_v4();

    // Register directly against the store: one live and one dead device.
    for endpoint in ["https://push.example/live", "https://push.example/dead"] {
        app.subscriptions
            .register(Subscription::new(
                endpoint.to_string(),
                cliniq_core::AccountId::from_uuid(holder),
                SubscriptionKeys {
                    p256dh: "BKey".to_string(),
                    auth: "secret".to_string(),
                },
                Utc::now(),
            ))
            .await
            .unwrap();
    }
    app.gateway
        .script("https://push.example/dead", ScriptedOutcome::Gone);

    book(&app, doctor, holder).await;
    let (status, _) = advance(&app, doctor, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    let dead = app.subscriptions.get("https://push.example/dead").unwrap();
    assert!(!dead.is_active, "gone endpoint must be retired");
    let live = app.subscriptions.get("https://push.example/live").unwrap();
    assert!(live.is_active);
}

#[tokio::test]
async fn hospital_alert_reaches_topic_subscribers() {
    let app = test_app();
    let hospital = Uuid::new_v4();
    let mut rx = app.broadcaster.subscribe(format!("hospital:{hospital}")).await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/hospitals/{hospital}/alerts"),
            Some(Uuid::new_v4()),
            Some("staff"),
            Some(json!({"message": "triage overflow"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (topic, event) = rx.recv().await.unwrap();
    assert_eq!(topic, format!("hospital:{hospital}"));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "hospital_alert");
    assert_eq!(value["message"], "triage overflow");
}

#[tokio::test]
async fn hospital_alert_requires_staff() {
    let app = test_app();
    let hospital = Uuid::new_v4();
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/hospitals/{hospital}/alerts"),
            Some(Uuid::new_v4()),
            None,
            Some(json!({"message": "nope"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

/// A full first day, end to end over HTTP: book, serve, cancel the
/// next ticket, advance into exhaustion-with-nobody-served.
#[tokio::test]
async fn full_day_walkthrough_over_http() {
    let app = test_app();
    let doctor = Uuid::new_v4();
    let staff = Uuid::new_v4();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    let ticket_one = book(&app, doctor, first).await;
    assert_eq!(ticket_one["number"], 1);

    let (status, body) = advance(&app, doctor, staff).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_number"], 1);

    let ticket_two = book(&app, doctor, second).await;
    let ticket_two_id = ticket_two["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        request(
            "DELETE",
            &format!("/api/tickets/{ticket_two_id}"),
            Some(second),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = advance(&app, doctor, staff).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["closed"]["number"], 1);
    assert_eq!(body["closed"]["status"], "completed");
    assert_eq!(body["current_number"], 2);
    assert!(body["serving"].is_null(), "ticket 2 was cancelled");

    let (status, body) = advance(&app, doctor, staff).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "QUEUE_EXHAUSTED");
}
