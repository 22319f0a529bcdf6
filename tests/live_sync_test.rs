//! Live collections across sessions sharing one in-memory store

use std::sync::Arc;
use std::time::Duration;
use zesty_ops::app::App;
use zesty_ops::config::AppConfig;
use zesty_ops::live::SyncState;
use zesty_ops::memory::{Fault, InMemoryBackend};
use zesty_ops::models::{Category, Incident, IncidentStatus, Priority};
use zesty_ops::navigation::{Nav, ViewTag};
use zesty_ops::repository::Backend;
use zesty_ops::sites::PinStatus;

const WAIT: Duration = Duration::from_secs(3);

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.feed.resolve_return_delay_ms = 0;
    config.feed.poll_interval_secs = 1;
    config
}

/// A signed-in app on its own handle onto `store`
async fn session(store: &InMemoryBackend, email: &str, password: &str) -> (Arc<InMemoryBackend>, App) {
    let handle = Arc::new(store.connect());
    let backend = Backend::from_shared(handle.clone());
    let mut app = App::ephemeral(&backend, config());
    assert!(app.sign_in(email, password).await);
    (handle, app)
}

fn incident(location: &str, description: &str) -> Incident {
    Incident {
        id: uuid::Uuid::new_v4(),
        location: location.to_string(),
        category: Category::Repair,
        priority: Priority::Low,
        description: description.to_string(),
        detailed_description: None,
        image_url: None,
        status: IncidentStatus::initial(),
        reported_by: None,
        created_at: chrono::Utc::now(),
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn resolve_in_one_session_drops_out_of_anothers_feed() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, mut app_a) = session(&store, email, password).await;
    let (_b, app_b) = session(&store, email, password).await;

    let mut feed = app_b.incidents().live_feed();
    let loaded = feed
        .wait_for(WAIT, |s| s.revision >= 1 && s.sync == SyncState::Live)
        .await
        .unwrap();
    assert_eq!(loaded.items.len(), 4);
    assert!(loaded.items.iter().all(|i| !i.is_resolved()));
    let target = loaded.items[0].clone();

    app_a.navigate(Nav::SelectIncident(target.clone()));
    let updated = app_a.resolve_selected().await.unwrap();
    assert!(updated.is_resolved());
    assert_eq!(app_a.router().view_tag(), Some(ViewTag::Dashboard));

    // well inside the 1 s poll period: the change notification drove this
    let after = feed
        .wait_for(Duration::from_millis(800), |s| s.items.iter().all(|i| i.id != target.id))
        .await
        .unwrap();
    assert_eq!(after.items.len(), 3);
    assert_eq!(after.sync, SyncState::Live);
}

#[tokio::test]
async fn resolved_incident_stays_in_history_marked() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, mut app) = session(&store, email, password).await;

    let mut all = app.incidents().live_history();
    let before = all.wait_for(WAIT, |s| s.revision >= 1 && s.sync == SyncState::Live).await.unwrap();
    assert_eq!(before.items.len(), 6);
    let target = before.items.iter().find(|i| !i.is_resolved()).cloned().unwrap();

    app.navigate(Nav::SelectIncident(target.clone()));
    app.resolve_selected().await.unwrap();

    let after = all
        .wait_for(WAIT, |s| s.items.iter().any(|i| i.id == target.id && i.is_resolved()))
        .await
        .unwrap();
    assert_eq!(after.items.len(), 6);
    let entries = zesty_ops::incidents::history(&after.items);
    let entry = entries.iter().find(|e| e.incident.id == target.id).unwrap();
    assert!(entry.resolved);
    assert_eq!(entry.marker(), "Resolved");
}

#[tokio::test]
async fn failed_refetch_keeps_the_previous_items() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, app) = session(&store, email, password).await;

    let mut feed = app.incidents().live_feed();
    let loaded = feed.wait_for(WAIT, |s| s.revision >= 1 && s.sync == SyncState::Live).await.unwrap();

    store.fail(Fault::ListIncidents);
    store.insert_incident_row(incident("Big Aviary", "Netting torn"));
    let failed = feed.wait_for(WAIT, |s| s.last_error.is_some()).await.unwrap();
    assert_eq!(failed.items, loaded.items);
    assert_eq!(failed.revision, loaded.revision);

    store.heal(Fault::ListIncidents);
    feed.refresh();
    let recovered = feed.wait_for(WAIT, |s| s.last_error.is_none() && s.revision > loaded.revision).await.unwrap();
    assert_eq!(recovered.items[0].description, "Netting torn");
}

#[tokio::test]
async fn dropping_a_collection_releases_its_subscription() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, app) = session(&store, email, password).await;
    assert_eq!(store.active_subscriptions(), 0);

    let mut feed = app.incidents().live_feed();
    let mut map = app.incidents().live_active();
    feed.wait_for(WAIT, |s| s.sync == SyncState::Live).await.unwrap();
    map.wait_for(WAIT, |s| s.sync == SyncState::Live).await.unwrap();
    assert_eq!(store.active_subscriptions(), 2);

    drop(feed);
    assert!(eventually(|| store.active_subscriptions() == 1).await);
    drop(map);
    assert!(eventually(|| store.active_subscriptions() == 0).await);
}

#[tokio::test]
async fn subscription_failure_falls_back_to_polling() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, app) = session(&store, email, password).await;
    store.fail(Fault::Subscribe);

    let mut feed = app.incidents().live_feed();
    let loaded = feed.wait_for(WAIT, |s| s.revision >= 1 && s.sync == SyncState::Polling).await.unwrap();
    assert!(loaded.last_error.is_none());
    assert_eq!(store.active_subscriptions(), 0);

    store.insert_incident_row(incident("Little Amazonia", "Misting system leaking"));
    let polled = feed
        .wait_for(WAIT, |s| s.items.iter().any(|i| i.description == "Misting system leaking"))
        .await
        .unwrap();
    assert_eq!(polled.sync, SyncState::Polling);
}

#[tokio::test]
async fn feed_is_capped_and_newest_first() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, app) = session(&store, email, password).await;

    let mut feed = app.incidents().live_feed();
    feed.wait_for(WAIT, |s| s.sync == SyncState::Live && s.revision >= 1).await.unwrap();
    for n in 0..3 {
        store.insert_incident_row(incident("Picnic Area", &format!("Bench {n} loose")));
    }

    let full = feed
        .wait_for(WAIT, |s| s.items.iter().any(|i| i.description == "Bench 2 loose"))
        .await
        .unwrap();
    assert_eq!(full.items.len(), app.incidents().page_size());
    assert!(full.items.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn facility_map_tracks_active_incidents() {
    let store = InMemoryBackend::new();
    let (email, password) = store.seed_demo();
    let (_a, app) = session(&store, email, password).await;

    let mut active = app.incidents().live_active();
    let snapshot = active.wait_for(WAIT, |s| s.revision >= 1).await.unwrap();
    let pins = zesty_ops::incidents::facility_map(&snapshot.items);

    let status = |name: &str| pins.iter().find(|p| p.name == name).map(|p| p.status);
    assert_eq!(status("Small Farm"), Some(PinStatus::Issue));
    assert_eq!(status("Giraffe Habitat"), Some(PinStatus::Issue));
    // only resolved incidents sit at the aviary
    assert_eq!(status("Big Aviary"), Some(PinStatus::Good));
}
