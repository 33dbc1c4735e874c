//! Read-side HTTP surface and the realtime client channel.
//!
//! Handlers only ever see store snapshots and monitor counters; the one
//! write path (`/simulate`) goes straight to the injection-capable sinks
//! and never touches the dedup store.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::Result;
use crate::error::Error;
use crate::model::AlertRecord;
use crate::monitor::FailureMonitor;
use crate::sinks::Dispatcher;
use crate::store::HistoryStore;

/// Event name pushed to connected clients, kept stable for existing
/// consumers of the original relay.
const CLIENT_EVENT: &str = "new_message";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<HistoryStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<FailureMonitor>,
    pub events: broadcast::Sender<AlertRecord>,
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(messages))
        .route("/status", get(status))
        .route("/ws", get(ws_upgrade))
        .route("/simulate", post(simulate))
        .with_state(state)
}

/// Bind and serve until the task is aborted.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| Error::Server { source })?;
    info!(%bind, "http server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|source| Error::Server { source })
}

async fn messages(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "messages": state.store.snapshot() }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "last_identifier": state.store.last_identifier(),
        "history_len": state.store.len(),
        "consecutive_failures": state.monitor.consecutive_failures(),
    }))
}

/// Trusted-caller injection of a simulated alert. Bypasses the dedup
/// store by design; only the broadcast and chat sinks see it.
async fn simulate(State(state): State<AppState>, Json(record): Json<AlertRecord>) -> Json<Value> {
    info!(identifier = %record.identifier, "simulated alert injected");
    state.dispatcher.inject(&record).await;
    Json(json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| client_session(socket, rx))
}

async fn client_session(mut socket: WebSocket, mut rx: broadcast::Receiver<AlertRecord>) {
    debug!("websocket client connected");
    loop {
        match rx.recv().await {
            Ok(record) => {
                let payload = match serde_json::to_string(&client_event(&record)) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "failed to encode record for websocket");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "slow websocket client skipped records");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("websocket client disconnected");
}

fn client_event(record: &AlertRecord) -> Value {
    json!({ "event": CLIENT_EVENT, "data": record })
}
