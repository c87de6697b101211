//! Push dispatcher fan-out tests.
//!
//! Covers partial success across an account's endpoints, permanent
//! retirement of gone endpoints, the zero-subscription no-op, and the
//! per-endpoint delivery timeout.
//!
//! Run with: `cargo test -p cliniq-push --test dispatcher_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Utc;
use cliniq_core::{AccountId, Clock, MessageKind, PushSender};
use cliniq_push::subscription::SubscriptionStore;
use cliniq_push::{PushDispatcher, PushGateway, Subscription, SubscriptionKeys};
use cliniq_testing::{test_clock, InMemorySubscriptionStore, ScriptedOutcome, ScriptedPushGateway};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn subscription(account: AccountId, endpoint: &str) -> Subscription {
    Subscription::new(
        endpoint.to_string(),
        account,
        SubscriptionKeys {
            p256dh: "BPubKey".to_string(),
            auth: "authsecret".to_string(),
        },
        Utc::now(),
    )
}

async fn register(store: &InMemorySubscriptionStore, sub: Subscription) {
    store.register(sub).await.expect("register succeeds");
}

fn dispatcher(
    store: &Arc<InMemorySubscriptionStore>,
    gateway: &Arc<ScriptedPushGateway>,
) -> PushDispatcher {
    let store_dyn: Arc<dyn SubscriptionStore> = store.clone();
    let gateway_dyn: Arc<dyn PushGateway> = gateway.clone();
    PushDispatcher::new(
        store_dyn,
        gateway_dyn,
        Arc::new(test_clock()),
    )
}

#[tokio::test]
async fn dead_endpoint_is_retired_while_live_delivery_succeeds() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let account = AccountId::new();

    register(&store, subscription(account, "https://push.example/live")).await;
    register(&store, subscription(account, "https://push.example/dead")).await;
    gateway.script("https://push.example/dead", ScriptedOutcome::Gone);

    let report = dispatcher(&store, &gateway)
        .notify(account, MessageKind::NowServing, json!({"number": 4}))
        .await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.retired, 1);
    assert_eq!(report.failed, 0);

    // The dead endpoint is flipped inactive, not deleted.
    let dead = store.get("https://push.example/dead").expect("still stored");
    assert!(!dead.is_active);
    let live = store.get("https://push.example/live").expect("still stored");
    assert!(live.is_active);

    // Only the live endpoint saw the payload.
    let deliveries = gateway.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "https://push.example/live");
}

#[tokio::test]
async fn retired_endpoint_is_not_attempted_again() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let account = AccountId::new();

    register(&store, subscription(account, "https://push.example/dead")).await;
    gateway.script("https://push.example/dead", ScriptedOutcome::Gone);

    let dispatcher = dispatcher(&store, &gateway);
    let first = dispatcher
        .notify(account, MessageKind::NowServing, json!({}))
        .await;
    assert_eq!(first.retired, 1);

    let second = dispatcher
        .notify(account, MessageKind::ApproachingTurn, json!({}))
        .await;
    assert_eq!(second.attempted, 0, "retired endpoint is skipped entirely");
}

#[tokio::test]
async fn no_subscriptions_is_a_trivial_success() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());

    let report = dispatcher(&store, &gateway)
        .notify(AccountId::new(), MessageKind::TicketResolved, json!({}))
        .await;

    assert_eq!(report, cliniq_core::DispatchReport::default());
    assert!(report.is_clean());
    assert!(gateway.deliveries().is_empty());
}

#[tokio::test]
async fn transient_failure_is_counted_but_keeps_endpoint_active() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let account = AccountId::new();

    register(&store, subscription(account, "https://push.example/flaky")).await;
    gateway.script(
        "https://push.example/flaky",
        ScriptedOutcome::Transient("503 service unavailable".to_string()),
    );

    let report = dispatcher(&store, &gateway)
        .notify(account, MessageKind::NowServing, json!({}))
        .await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.retired, 0);
    let flaky = store.get("https://push.example/flaky").expect("still stored");
    assert!(flaky.is_active, "transient failures never retire an endpoint");
}

#[tokio::test]
async fn hung_endpoint_times_out_without_stalling_the_rest() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let account = AccountId::new();

    register(&store, subscription(account, "https://push.example/hung")).await;
    register(&store, subscription(account, "https://push.example/live")).await;
    gateway.script("https://push.example/hung", ScriptedOutcome::Hang);

    let report = dispatcher(&store, &gateway)
        .with_delivery_timeout(Duration::from_millis(50))
        .notify(account, MessageKind::NowServing, json!({}))
        .await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1, "the hung endpoint is a transient failure");
}

#[tokio::test]
async fn successful_delivery_refreshes_last_used() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let account = AccountId::new();

    register(&store, subscription(account, "https://push.example/live")).await;

    dispatcher(&store, &gateway)
        .notify(account, MessageKind::FeedbackEligible, json!({}))
        .await;

    let live = store.get("https://push.example/live").expect("stored");
    assert_eq!(live.last_used, Some(test_clock().now()));
}

#[tokio::test]
async fn payload_carries_kind_and_params() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let gateway = Arc::new(ScriptedPushGateway::new());
    let account = AccountId::new();

    register(&store, subscription(account, "https://push.example/live")).await;

    dispatcher(&store, &gateway)
        .notify(
            account,
            MessageKind::ApproachingTurn,
            json!({"tickets_ahead": 2}),
        )
        .await;

    let deliveries = gateway.deliveries();
    let payload: serde_json::Value = serde_json::from_slice(&deliveries[0].1).unwrap();
    assert_eq!(payload["kind"], "approaching-turn");
    assert_eq!(payload["params"]["tickets_ahead"], 2);
}
