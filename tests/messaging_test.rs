//! Compose, inbox and threads between two signed-in colleagues

use std::sync::Arc;
use std::time::Duration;
use zesty_ops::app::{App, NoticeLevel};
use zesty_ops::config::AppConfig;
use zesty_ops::live::SyncState;
use zesty_ops::memory::{Fault, InMemoryBackend};
use zesty_ops::navigation::{Nav, Overlay};
use zesty_ops::repository::Backend;

const WAIT: Duration = Duration::from_secs(3);

async fn session(store: &InMemoryBackend, email: &str, password: &str) -> App {
    let backend = Backend::from_shared(Arc::new(store.connect()));
    let mut app = App::ephemeral(&backend, AppConfig::default());
    assert!(app.sign_in(email, password).await);
    app.notices().drain();
    app
}

struct Staff {
    store: InMemoryBackend,
    john: App,
    sarah: App,
}

async fn staff() -> Staff {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let john = session(&store, email, password).await;
    let sarah = session(&store, "sarah.johnson@zoo.org", password).await;
    Staff { store, john, sarah }
}

#[tokio::test]
async fn compose_sends_one_message_and_closes() {
    let Staff { store, mut john, sarah } = staff().await;
    let me = john.user_id().unwrap();
    let sarah_id = sarah.user_id().unwrap();

    john.navigate(Nav::OpenMessaging);
    john.navigate(Nav::ComposeNew);
    assert_eq!(john.router().overlay(), Overlay::Compose);

    let picks = john.messaging().search_recipients(me, "sarah").await.unwrap();
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].id, sarah_id);

    let sent = john.send_message(sarah_id, "  Tiger enclosure checked, all good  ").await.unwrap();
    assert_eq!(sent.content, "Tiger enclosure checked, all good");
    assert_eq!(sent.sender_id, me);
    assert_eq!(store.call_count("insert_message"), 1);
    assert_eq!(john.router().overlay(), Overlay::Hidden);
    assert_eq!(john.notices().drain()[0].level, NoticeLevel::Success);
}

#[tokio::test]
async fn recipient_sees_the_message_in_their_inbox() {
    let Staff { store: _store, mut john, sarah } = staff().await;
    let me = john.user_id().unwrap();
    let sarah_id = sarah.user_id().unwrap();

    let mut live = sarah.messaging().live_messages(sarah_id);
    live.wait_for(WAIT, |s| s.revision >= 1 && s.sync == SyncState::Live).await.unwrap();

    john.send_message(sarah_id, "On my way to the tiger enclosure").await.unwrap();

    let snapshot = live
        .wait_for(WAIT, |s| s.items.iter().any(|m| m.content == "On my way to the tiger enclosure"))
        .await
        .unwrap();
    let inbox = sarah.messaging().summarize_snapshot(sarah_id, &snapshot.items).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].counterpart, me);
    assert_eq!(inbox[0].name, "John Smith");
    assert_eq!(inbox[0].initials, "JS");
    assert_eq!(inbox[0].preview, "On my way to the tiger enclosure");
    assert!(!inbox[0].last_from_me);
    assert_eq!(inbox[0].message_count, 2);
}

#[tokio::test]
async fn inbox_is_most_recent_first() {
    let Staff { store: _store, mut john, .. } = staff().await;
    let me = john.user_id().unwrap();
    let mike = john.messaging().search_recipients(me, "mike").await.unwrap()[0].id;

    john.send_message(mike, "Can you sign off the aviary repair?").await.unwrap();

    let inbox = john.messaging().inbox(me).await.unwrap();
    let names: Vec<&str> = inbox.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Mike Chen", "Sarah Johnson"]);
    assert!(inbox[0].last_from_me);
    assert!(!inbox[1].last_from_me);
}

#[tokio::test]
async fn thread_is_oldest_first_with_direction() {
    let Staff { store: _store, mut john, mut sarah } = staff().await;
    let me = john.user_id().unwrap();
    let sarah_id = sarah.user_id().unwrap();

    john.reply(sarah_id, "Checked it, the latch was loose").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    sarah.reply(me, "Thanks John!").await.unwrap();

    let thread = john.messaging().thread(me, sarah_id).await.unwrap();
    let bodies: Vec<(&str, bool)> = thread.iter().map(|m| (m.body.as_str(), m.is_sent)).collect();
    assert_eq!(
        bodies,
        vec![
            ("Hey John! Can you check the tiger enclosure report?", false),
            ("Checked it, the latch was loose", true),
            ("Thanks John!", false),
        ]
    );
}

#[tokio::test]
async fn invalid_messages_are_never_written() {
    let Staff { store, mut john, .. } = staff().await;
    let me = john.user_id().unwrap();

    assert!(john.send_message(uuid::Uuid::new_v4(), "   ").await.is_none());
    assert!(john.send_message(me, "Note to self").await.is_none());
    assert!(john.send_message(uuid::Uuid::nil(), "Hello?").await.is_none());
    assert!(john.send_message(uuid::Uuid::new_v4(), &"a".repeat(2001)).await.is_none());

    assert_eq!(store.call_count("insert_message"), 0);
    let notices = john.notices().drain();
    assert_eq!(notices.len(), 4);
    assert!(notices.iter().all(|n| n.level == NoticeLevel::Error));
}

#[tokio::test]
async fn failed_send_keeps_compose_open() {
    let Staff { store, mut john, sarah } = staff().await;
    let sarah_id = sarah.user_id().unwrap();
    john.navigate(Nav::ComposeNew);
    store.fail(Fault::InsertMessage);

    assert!(john.send_message(sarah_id, "Are you on shift today?").await.is_none());
    assert_eq!(john.router().overlay(), Overlay::Compose);
    assert_eq!(john.notices().drain()[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn sending_refreshes_a_polling_inbox_at_once() {
    let Staff { store, mut john, sarah } = staff().await;
    let sarah_id = sarah.user_id().unwrap();
    store.fail(Fault::Subscribe);

    let loaded = john
        .inbox()
        .unwrap()
        .wait_for(WAIT, |s| s.revision >= 1 && s.sync == SyncState::Polling)
        .await
        .unwrap();
    assert_eq!(loaded.items.len(), 1);

    john.send_message(sarah_id, "Tiger enclosure latch replaced").await.unwrap();

    // the poll period is 5 s, so only the post-send refresh can land this in time
    let refreshed = john
        .inbox()
        .unwrap()
        .wait_for(Duration::from_secs(2), |s| s.items.iter().any(|m| m.content == "Tiger enclosure latch replaced"))
        .await
        .unwrap();
    assert_eq!(refreshed.items.len(), 2);

    john.reply(sarah_id, "Photos in the report").await.unwrap();
    john.inbox()
        .unwrap()
        .wait_for(Duration::from_secs(2), |s| s.items.len() == 3)
        .await
        .unwrap();
}

#[tokio::test]
async fn inbox_is_released_on_sign_out() {
    let Staff { store, mut john, .. } = staff().await;
    john.inbox().unwrap().wait_for(WAIT, |s| s.sync == SyncState::Live).await.unwrap();
    assert_eq!(store.active_subscriptions(), 1);

    john.sign_out().await;

    assert!(john.inbox().is_err());
    for _ in 0..50 {
        if store.active_subscriptions() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(store.active_subscriptions(), 0);
}
