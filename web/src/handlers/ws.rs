//! Topic-based WebSocket handler.
//!
//! Clients subscribe to the routing keys they care about and receive only
//! those topics' events. There is no history: whatever was published
//! before the subscription is gone, and clients are expected to fetch
//! current queue state over the REST surface on (re)connect.
//!
//! # Message Protocol
//!
//! **Client → Server (Subscribe):**
//! ```json
//! { "type": "subscribe", "topics": ["queue:<doctor>:<date>", "account:<id>"] }
//! ```
//!
//! **Client → Server (Unsubscribe):**
//! ```json
//! { "type": "unsubscribe", "topics": ["queue:<doctor>:<date>"] }
//! ```
//!
//! **Server → Client (Event):**
//! ```json
//! { "type": "event", "topic": "queue:...", "event": { "type": "now_serving", ... } }
//! ```

use crate::broadcast::TopicBroadcaster;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use cliniq_core::LiveEvent;
use futures::{stream::StreamExt, SinkExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// WebSocket frames exchanged with subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client joins the given topics
    Subscribe {
        /// Routing keys to join
        topics: Vec<String>,
    },
    /// Client leaves the given topics
    Unsubscribe {
        /// Routing keys to leave
        topics: Vec<String>,
    },
    /// Server delivers one event from a subscribed topic
    Event {
        /// Topic the event was published on
        topic: String,
        /// The event payload
        event: LiveEvent,
    },
    /// Keep-alive from the client
    Ping,
    /// Keep-alive answer
    Pong,
}

/// Axum handler upgrading the connection and driving the subscription
/// loop.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(
    ws: WebSocketUpgrade,
    State(broadcaster): State<TopicBroadcaster>,
) -> Response {
    info!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Connection lifecycle: a receive task tracks the subscription set, a
/// send task drains the subscribed topics' channels into the socket.
#[allow(clippy::cognitive_complexity)] // subscription bookkeeping + protocol dispatch
async fn handle_socket(socket: WebSocket, broadcaster: TopicBroadcaster) {
    info!("WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let subscribed_topics = Arc::new(RwLock::new(HashSet::new()));

    let recv_subscriptions = Arc::clone(&subscribed_topics);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<WsMessage>(&text) {
                    Ok(WsMessage::Subscribe { topics }) => {
                        debug!(?topics, "client subscribing to topics");
                        let mut subs = recv_subscriptions.write().await;
                        for topic in topics {
                            subs.insert(topic);
                        }
                    }
                    Ok(WsMessage::Unsubscribe { topics }) => {
                        debug!(?topics, "client unsubscribing from topics");
                        let mut subs = recv_subscriptions.write().await;
                        for topic in &topics {
                            subs.remove(topic);
                        }
                    }
                    Ok(WsMessage::Ping) => {
                        debug!("received ping from client");
                    }
                    Ok(other) => {
                        warn!(?other, "unexpected message type from client");
                    }
                    Err(e) => {
                        error!(error = %e, "failed to parse WebSocket message");
                    }
                },
                Message::Close(_) => {
                    info!("client requested close");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    warn!("received unexpected binary message");
                }
            }
        }

        debug!("WebSocket receive task terminated");
    });

    let send_subscriptions = Arc::clone(&subscribed_topics);
    let mut send_task = tokio::spawn(async move {
        let mut receivers: HashMap<String, broadcast::Receiver<(String, LiveEvent)>> =
            HashMap::new();

        loop {
            // Reconcile channel receivers with the client's current set.
            let topics: Vec<String> = {
                let subs = send_subscriptions.read().await;
                subs.iter().cloned().collect()
            };
            for topic in &topics {
                if !receivers.contains_key(topic) {
                    receivers.insert(topic.clone(), broadcaster.subscribe(topic.clone()).await);
                    debug!(topic = %topic, "joined topic");
                }
            }
            receivers.retain(|topic, _| topics.contains(topic));

            let mut received_event = false;
            for (topic, rx) in &mut receivers {
                match rx.try_recv() {
                    Ok((event_topic, event)) => {
                        let frame = WsMessage::Event {
                            topic: event_topic,
                            event,
                        };
                        if let Ok(json) = serde_json::to_string(&frame) {
                            if sender.send(Message::Text(json)).await.is_err() {
                                // Client disconnected
                                return;
                            }
                            received_event = true;
                        }
                    }
                    Err(broadcast::error::TryRecvError::Empty) => {}
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "client lagging, skipped events");
                    }
                    Err(broadcast::error::TryRecvError::Closed) => {
                        debug!(topic = %topic, "topic channel closed");
                    }
                }
            }

            if !received_event {
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            debug!("send task completed, aborting receive task");
            recv_task.abort();
        },
        _ = (&mut recv_task) => {
            debug!("receive task completed, aborting send task");
            send_task.abort();
        },
    }

    info!("WebSocket connection closed");
}
