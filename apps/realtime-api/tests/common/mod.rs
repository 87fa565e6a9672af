#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use realtime_api::config::Config;
use realtime_api::db::memory::MemoryStore;
use realtime_api::db::store::MemberRecord;
use realtime_api::gateway::{Gateway, GatewaySettings};
use realtime_api::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait before deciding no frame is coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        port: 0,
        session_cookie: "member_session".to_string(),
        typing_timeout: Duration::from_secs(5),
        keepalive_interval: Duration::from_secs(25),
        idle_timeout: Duration::from_secs(60),
        broadcast_capacity: 1024,
    }
}

pub fn member(org_id: &str, id: &str, first_name: &str, last_name: &str) -> MemberRecord {
    MemberRecord {
        id: id.to_string(),
        org_id: org_id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        avatar_url: None,
        banned_at: None,
        muted_until: None,
    }
}

/// A realtime server on an ephemeral port, backed by an in-memory store.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub async fn start_server() -> TestServer {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(Gateway::new(store.clone(), GatewaySettings::from(&config)));
    let state = AppState {
        config: Arc::new(config),
        sessions: store.clone(),
        gateway,
    };

    let app = realtime_api::routes::router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state, store }
}

impl TestServer {
    /// Seed a member with a current-format session under `token`.
    pub fn seed(&self, record: MemberRecord, token: &str) {
        self.store.insert_session(token, &record.id);
        self.store.insert_member(record);
    }

    /// Open a socket, sending `token` in the session cookie when given.
    pub async fn try_connect(&self, token: Option<&str>) -> Result<WsStream, tungstenite::Error> {
        let mut request = format!("ws://{}/socket", self.addr)
            .into_client_request()
            .expect("request");
        if let Some(token) = token {
            request.headers_mut().insert(
                "Cookie",
                HeaderValue::from_str(&format!("theme=dark; member_session={token}")).unwrap(),
            );
        }
        tokio_tungstenite::connect_async(request)
            .await
            .map(|(ws, _)| ws)
    }

    /// Connect and consume the `members:online` greeting, returning its roster.
    pub async fn connect(&self, token: &str) -> (WsStream, Value) {
        let mut ws = self.try_connect(Some(token)).await.expect("ws connect");
        let greeting = next_event(&mut ws).await;
        assert_eq!(greeting["event"], "members:online");
        (ws, greeting["data"].clone())
    }
}

/// Status code of a refused upgrade.
pub fn rejection_status(err: tungstenite::Error) -> u16 {
    match err {
        tungstenite::Error::Http(response) => response.status().as_u16(),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

pub async fn send_event(ws: &mut WsStream, event: &str, data: Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send");
}

/// Next JSON event, skipping control frames.
pub async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert no event arrives within [`QUIET_PERIOD`].
pub async fn assert_silent(ws: &mut WsStream) {
    let deadline = time::Instant::now() + QUIET_PERIOD;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

/// Round-trip a ping so every earlier frame on this socket has been handled.
pub async fn sync(ws: &mut WsStream) {
    send_event(ws, "ping", Value::Null).await;
    let reply = next_event(ws).await;
    assert_eq!(reply["event"], "pong");
}

pub async fn join(ws: &mut WsStream, room: &str) {
    send_event(ws, "join", Value::String(room.to_string())).await;
    sync(ws).await;
}
