//! WebSocket upgrade handler and per-connection event loop.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::auth::middleware::AdmittedMember;
use crate::AppState;

use super::events::{ClientEvent, ServerEvent};
use super::GatewayConnection;

type SocketSink = SplitSink<WebSocket, Message>;

/// Close code sent when a connection stays silent past the idle timeout.
const CLOSE_IDLE_TIMEOUT: u16 = 4009;

/// How long to wait for the client to answer a server-initiated close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

/// Authentication runs in the extractor, so a refused connection gets a
/// plain HTTP error and never reaches the upgrade.
async fn ws_upgrade(
    State(state): State<AppState>,
    AdmittedMember(identity): AdmittedMember,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let connection = state.gateway.connect(identity).await;
        run_connection(
            socket,
            connection,
            state.config.keepalive_interval,
            state.config.idle_timeout,
        )
        .await;
    })
}

/// Main connection loop: read client frames, forward addressed broadcasts,
/// ping the client and drop it once it goes quiet.
async fn run_connection(
    socket: WebSocket,
    connection: GatewayConnection,
    keepalive_interval: Duration,
    idle_timeout: Duration,
) {
    let GatewayConnection {
        mut dispatcher,
        mut events,
        greeting,
    } = connection;
    let (mut ws_tx, mut ws_rx) = socket.split();

    if send_event(&mut ws_tx, &greeting).await.is_ok() {
        let mut keepalive = time::interval(keepalive_interval);
        keepalive.tick().await; // First tick fires immediately; skip it.
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            // Malformed or unknown frames are dropped without a reply.
                            let Some(event) = ClientEvent::parse(text.as_str()) else {
                                tracing::debug!(
                                    connection_id = %dispatcher.session().connection_id,
                                    "ignoring malformed frame"
                                );
                                continue;
                            };
                            if let Some(reply) = dispatcher.handle(event).await {
                                if send_event(&mut ws_tx, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            last_activity = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::debug!(
                                ?e,
                                connection_id = %dispatcher.session().connection_id,
                                "ws read error"
                            );
                            break;
                        }
                        _ => continue,
                    }
                }

                result = events.recv() => {
                    match result {
                        Ok(payload) => {
                            if !dispatcher.should_deliver(&payload) {
                                continue;
                            }
                            if send_event(&mut ws_tx, &payload.event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(
                                connection_id = %dispatcher.session().connection_id,
                                skipped = n,
                                "gateway connection lagged behind broadcast"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = keepalive.tick() => {
                    if last_activity.elapsed() > idle_timeout {
                        tracing::debug!(
                            connection_id = %dispatcher.session().connection_id,
                            "idle timeout, closing connection"
                        );
                        if send_close(&mut ws_tx, CLOSE_IDLE_TIMEOUT, "Idle timeout").await.is_ok() {
                            await_close_reply(&mut ws_rx).await;
                        }
                        break;
                    }
                    if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    dispatcher.disconnect().await;
}

async fn send_event(ws_tx: &mut SocketSink, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut SocketSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

/// Keep reading until the client acknowledges our close frame, so queued
/// frames on its side can still be answered and the close code reaches it.
async fn await_close_reply(ws_rx: &mut SplitStream<WebSocket>) {
    let _ = time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
}
