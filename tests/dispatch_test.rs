use chrono::Utc;
use influence_rust::client::SubscriptionMode;
use influence_rust::jid::{BareJid, Jid};
use influence_rust::test_utils::{MockServer, create_test_client, create_test_client_with, test_credentials};
use influence_rust::transport::ConnectionEvent;
use influence_rust::types::archive::ArchivedMessage;
use influence_rust::types::events::Event;
use influence_rust::types::message::ChatMessage;
use influence_rust::types::presence::{Presence, PresenceType};
use influence_rust::types::roster::{RosterEntry, Subscription};
use influence_rust::types::vcard::VCard;
use influence_rust::{Client, SessionError};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn jid(s: &str) -> BareJid {
    s.parse().expect("valid jid")
}

fn presence(kind: PresenceType, from: &str) -> Presence {
    let mut presence = Presence::new(kind);
    presence.from = Some(from.parse::<Jid>().expect("valid jid"));
    presence
}

fn record_events(client: &Client) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client
        .context()
        .event_bus()
        .add_handler(Arc::new(move |event: &Event| {
            sink.lock().unwrap().push(event.clone());
        }));
    events
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_send_message_requires_live_session() {
    let (client, server) = create_test_client().await;

    assert_eq!(client.send_message(&jid("bob@example.org"), "hi").await, None);
    assert!(server.sent_messages().is_empty());
}

#[tokio::test]
async fn test_send_message_returns_id() {
    let (client, server) = create_test_client().await;
    client.connect().await.expect("connect should succeed");

    let id = client
        .send_message(&jid("bob@example.org"), "hello bob")
        .await
        .expect("message should be sent");

    let sent = server.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, id);
    assert_eq!(sent[0].body, "hello bob");
    assert_eq!(sent[0].to.to_bare(), jid("bob@example.org"));
    assert_eq!(
        sent[0].from.as_ref().map(Jid::to_bare),
        Some(jid("alice@example.org"))
    );
}

#[tokio::test]
async fn test_send_failure_yields_none() {
    let (client, server) = create_test_client().await;
    client.connect().await.expect("connect should succeed");
    server.fail_sends.store(true, Ordering::SeqCst);

    assert_eq!(client.send_message(&jid("bob@example.org"), "lost").await, None);
}

#[tokio::test]
async fn test_contact_list_waits_for_roster() {
    let server = MockServer::default();
    server.set_roster(vec![
        RosterEntry::new(jid("bob@example.org"), Subscription::Both),
        RosterEntry::new(jid("carol@example.org"), Subscription::To),
    ]);
    server.set_roster_delay(Duration::from_millis(200));
    let (client, _server) = create_test_client_with(test_credentials(), server).await;
    client.connect().await.expect("connect should succeed");

    let contacts = client.get_contact_list().await.expect("roster should load");

    assert_eq!(contacts.len(), 2);
    assert!(contacts.iter().any(|c| c.jid == jid("carol@example.org")));
}

#[tokio::test]
async fn test_contact_list_times_out_on_slow_roster() {
    let server = MockServer::default();
    server.set_roster_delay(Duration::from_secs(5));
    let (client, _server) = create_test_client_with(test_credentials(), server).await;
    client.connect().await.expect("connect should succeed");

    let result = client
        .get_contact_list_within(Duration::from_millis(100))
        .await;

    assert!(matches!(result, Err(SessionError::RosterTimeout(d)) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn test_contact_list_when_offline() {
    let (client, _server) = create_test_client().await;
    assert!(matches!(
        client.get_contact_list().await,
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_user_presence_tracks_roster_updates() {
    let server = MockServer::default();
    server.set_roster(vec![RosterEntry::new(jid("bob@example.org"), Subscription::Both)]);
    let (client, server) = create_test_client_with(test_credentials(), server).await;

    assert!(matches!(
        client.get_user_presence(&jid("bob@example.org")),
        Err(SessionError::RosterUnavailable)
    ));

    client.connect().await.expect("connect should succeed");
    client.get_contact_list().await.expect("roster should load");

    let bob = jid("bob@example.org");
    assert!(!client.get_user_presence(&bob).expect("roster").is_available());

    server
        .emit(ConnectionEvent::Presence(presence(
            PresenceType::Available,
            "bob@example.org/phone",
        )))
        .await;
    assert!(
        wait_until(|| client
            .get_user_presence(&bob)
            .map(|p| p.is_available())
            .unwrap_or(false))
        .await
    );

    let stranger = client
        .get_user_presence(&jid("mallory@example.org"))
        .expect("roster");
    assert_eq!(stranger.kind, PresenceType::Unavailable);
    assert_eq!(stranger.owner(), Some(jid("mallory@example.org")));
}

#[tokio::test]
async fn test_avatar_lookup() {
    let server = MockServer::default();
    server.set_vcard(
        jid("bob@example.org"),
        VCard {
            avatar: Some(vec![0x89, 0x50, 0x4e, 0x47]),
            avatar_mime_type: Some("image/png".to_string()),
            ..Default::default()
        },
    );
    let (client, _server) = create_test_client_with(test_credentials(), server).await;

    assert_eq!(client.get_avatar(&jid("bob@example.org")).await, None);

    client.connect().await.expect("connect should succeed");
    assert_eq!(
        client.get_avatar(&jid("bob@example.org")).await,
        Some(vec![0x89, 0x50, 0x4e, 0x47])
    );
    assert_eq!(client.get_avatar(&jid("carol@example.org")).await, None);
}

#[tokio::test]
async fn test_archive_handle_when_supported() {
    let server = MockServer::default();
    server.archive_supported.store(true, Ordering::SeqCst);
    let mut from_bob = ChatMessage::chat(
        "m1".to_string(),
        Jid::from(jid("alice@example.org")),
        "are you there?",
    );
    from_bob.from = Some(Jid::from(jid("bob@example.org")));
    server.set_archive(vec![
        ArchivedMessage {
            archive_id: "a1".to_string(),
            stamp: Utc::now(),
            message: from_bob,
        },
        ArchivedMessage {
            archive_id: "a2".to_string(),
            stamp: Utc::now(),
            message: ChatMessage::chat(
                "m2".to_string(),
                Jid::from(jid("carol@example.org")),
                "lunch?",
            ),
        },
    ]);
    let (client, _server) = create_test_client_with(test_credentials(), server).await;

    assert!(client.get_archive_handle().is_none());
    client.connect().await.expect("connect should succeed");

    let archive = client.get_archive_handle().expect("archive supported");
    let history = archive
        .history_with(&jid("bob@example.org"), 10)
        .await
        .expect("query should succeed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].archive_id, "a1");

    client.disconnect().await;
    assert!(client.get_archive_handle().is_none());
}

#[tokio::test]
async fn test_no_archive_handle_without_server_support() {
    let (client, _server) = create_test_client().await;
    client.connect().await.expect("connect should succeed");
    assert!(client.get_archive_handle().is_none());
}

#[tokio::test]
async fn test_subscription_requests_are_auto_accepted() {
    let (client, server) = create_test_client().await;
    let events = record_events(&client);
    client.connect().await.expect("connect should succeed");
    assert_eq!(client.subscription_mode(), SubscriptionMode::AcceptAll);

    server
        .emit(ConnectionEvent::Presence(presence(
            PresenceType::Subscribe,
            "carol@example.org",
        )))
        .await;

    assert!(
        wait_until(|| server
            .sent_presences()
            .iter()
            .any(|p| p.kind == PresenceType::Subscribed))
        .await
    );
    let approved = server
        .sent_presences()
        .into_iter()
        .find(|p| p.kind == PresenceType::Subscribed)
        .and_then(|p| p.to)
        .map(|to| to.to_bare());
    assert_eq!(approved, Some(jid("carol@example.org")));
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        Event::SubscriptionRequest(r) if r.approved && r.from == jid("carol@example.org")
    )));
}

#[tokio::test]
async fn test_manual_mode_only_reports_requests() {
    let (client, server) = create_test_client().await;
    let events = record_events(&client);
    client.connect().await.expect("connect should succeed");
    client.set_subscription_mode(SubscriptionMode::Manual);

    server
        .emit(ConnectionEvent::Presence(presence(
            PresenceType::Subscribe,
            "dave@example.org",
        )))
        .await;

    assert!(
        wait_until(|| events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::SubscriptionRequest(r) if !r.approved)))
        .await
    );
    assert!(server.sent_presences().is_empty());
}

#[tokio::test]
async fn test_incoming_messages_reach_event_bus() {
    let (client, server) = create_test_client().await;
    let events = record_events(&client);
    client.connect().await.expect("connect should succeed");

    let mut message = ChatMessage::chat(
        "in-1".to_string(),
        Jid::from(jid("alice@example.org")),
        "ping",
    );
    message.from = Some("bob@example.org/phone".parse().expect("valid jid"));
    server.emit(ConnectionEvent::Message(message)).await;

    assert!(
        wait_until(|| events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::Message(m) if m.body == "ping")))
        .await
    );
}

#[tokio::test]
async fn test_presence_before_roster_load_is_kept() {
    let server = MockServer::default();
    server.set_roster(vec![RosterEntry::new(jid("bob@example.org"), Subscription::Both)]);
    server.set_roster_delay(Duration::from_millis(200));
    let (client, server) = create_test_client_with(test_credentials(), server).await;
    client.connect().await.expect("connect should succeed");

    server
        .emit(ConnectionEvent::Presence(presence(
            PresenceType::Available,
            "bob@example.org/phone",
        )))
        .await;
    client.get_contact_list().await.expect("roster should load");

    assert!(
        wait_until(|| client
            .get_user_presence(&jid("bob@example.org"))
            .map(|p| p.is_available())
            .unwrap_or(false))
        .await
    );
}

#[tokio::test]
async fn test_failed_roster_load_is_reported_without_waiting() {
    let server = MockServer::default();
    server.fail_roster.store(true, Ordering::SeqCst);
    let (client, _server) = create_test_client_with(test_credentials(), server).await;
    let events = record_events(&client);
    client.connect().await.expect("connect should succeed");

    let result = client.get_contact_list_within(Duration::from_secs(30)).await;

    assert!(matches!(result, Err(SessionError::RosterUnavailable)));
    assert!(matches!(
        client.get_user_presence(&jid("bob@example.org")),
        Err(SessionError::RosterUnavailable)
    ));
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        Event::RosterLoadFailed { error } if error.contains("service-unavailable")
    )));
}

#[tokio::test]
async fn test_send_during_reconnect_gap_is_not_confirmed() {
    let (client, server) = create_test_client().await;
    let events = record_events(&client);
    client.connect().await.expect("connect should succeed");

    server.fail_connect.store(true, Ordering::SeqCst);
    server
        .emit(ConnectionEvent::ConnectionClosedOnError("network lost".to_string()))
        .await;
    assert!(
        wait_until(|| events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::Reconnecting(_))))
        .await
    );

    assert!(!client.is_alive());
    assert_eq!(client.send_message(&jid("bob@example.org"), "anyone?").await, None);
    assert!(server.sent_messages().is_empty());

    client.disconnect().await;
}
