//! Typing indicator expiry under a paused clock.

use std::sync::Arc;
use std::time::Duration;

use realtime_api::db::memory::MemoryStore;
use realtime_api::gateway::events::{ClientEvent, ServerEvent};
use realtime_api::gateway::session::ConnectionIdentity;
use realtime_api::gateway::{Gateway, GatewayConnection, GatewaySettings};
use tokio::time;

fn identity(member_id: &str, name: &str) -> ConnectionIdentity {
    ConnectionIdentity {
        member_id: member_id.to_string(),
        org_id: "o1".to_string(),
        display_name: name.to_string(),
        avatar_url: None,
        banned_at: None,
        muted_until: None,
    }
}

async fn in_thread(gateway: &Arc<Gateway>, member_id: &str, name: &str) -> GatewayConnection {
    let mut conn = gateway.connect(identity(member_id, name)).await;
    conn.dispatcher
        .handle(ClientEvent::Join("thread:t1".to_string()))
        .await;
    conn
}

fn typing_flags(events: &[ServerEvent]) -> Vec<bool> {
    events
        .iter()
        .filter(|e| e.event == "typing:update")
        .map(|e| e.data["isTyping"].as_bool().unwrap())
        .collect()
}

async fn start_typing(conn: &mut GatewayConnection) {
    conn.dispatcher
        .handle(ClientEvent::TypingStart {
            thread_id: "t1".into(),
        })
        .await;
}

async fn setup() -> (Arc<Gateway>, GatewayConnection, GatewayConnection) {
    let gateway = Arc::new(Gateway::new(
        Arc::new(MemoryStore::new()),
        GatewaySettings::default(),
    ));
    let ann = in_thread(&gateway, "m1", "Ann").await;
    let mut bob = in_thread(&gateway, "m2", "Bob").await;
    bob.pending_events();
    (gateway, ann, bob)
}

#[tokio::test(start_paused = true)]
async fn refreshed_indicator_outlives_the_first_timer() {
    let (_gateway, mut ann, mut bob) = setup().await;

    start_typing(&mut ann).await;
    time::sleep(Duration::from_secs(3)).await;
    start_typing(&mut ann).await;
    assert_eq!(typing_flags(&bob.pending_events()), vec![true, true]);

    // The first timer fires at t=5s but the indicator was refreshed at 3s.
    time::sleep(Duration::from_millis(2500)).await;
    assert!(typing_flags(&bob.pending_events()).is_empty());

    // The second timer fires at t=8s.
    time::sleep(Duration::from_secs(3)).await;
    assert_eq!(typing_flags(&bob.pending_events()), vec![false]);

    time::sleep(Duration::from_secs(10)).await;
    assert!(bob.pending_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn explicit_stop_is_not_followed_by_a_second_clear() {
    let (gateway, mut ann, mut bob) = setup().await;

    start_typing(&mut ann).await;
    ann.dispatcher
        .handle(ClientEvent::TypingStop {
            thread_id: "t1".into(),
        })
        .await;
    assert_eq!(typing_flags(&bob.pending_events()), vec![true, false]);

    time::sleep(Duration::from_secs(6)).await;
    assert!(bob.pending_events().is_empty());
    assert!(gateway
        .typing()
        .typing_members(
            &realtime_api::gateway::typing::ThreadKey::new("o1", "t1"),
            time::Instant::now()
        )
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_is_honoured() {
    let gateway = Arc::new(Gateway::new(
        Arc::new(MemoryStore::new()),
        GatewaySettings {
            typing_timeout: Duration::from_secs(2),
            ..GatewaySettings::default()
        },
    ));
    let mut ann = in_thread(&gateway, "m1", "Ann").await;
    let mut bob = in_thread(&gateway, "m2", "Bob").await;
    bob.pending_events();

    start_typing(&mut ann).await;
    time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(typing_flags(&bob.pending_events()), vec![true, false]);
}
