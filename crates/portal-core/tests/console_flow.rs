//! End-to-end flows through `Console` with a file-backed store, simulating
//! two consecutive runs of a host that resumes where it left off.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use portal_core::controller::Settled;
use portal_core::filters::{ActivityStatus, AnalyticsRange, KeyFilters, StatusFilter};
use portal_core::keys::{AutoConfirm, MutationOutcome};
use portal_core::prefs::Preferences;
use portal_core::session::SESSION_STORE_KEY;
use portal_core::testing::{Endpoint, ScriptedApi};
use portal_core::{AuthState, Console, HashRouter, View};
use portal_storage::{FileStore, StateStore};

async fn run(api: &Arc<ScriptedApi>, store: &Arc<FileStore>) -> Console {
    let prefs = Preferences::new(store.clone());
    let fragment = prefs.location().await.unwrap_or_default();
    let console = Console::new(api.clone(), store.clone(), Arc::new(HashRouter::new(fragment)));
    console.start().await;
    console
}

#[tokio::test]
async fn second_run_resumes_session_location_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let api = Arc::new(ScriptedApi::new());

    let first = run(&api, &store).await;
    assert!(matches!(first.auth_state(), AuthState::Unauthenticated { .. }));
    first.login("owner@example.com", "long enough").await.unwrap();
    first.set_range(AnalyticsRange::Last30d).await;
    first.open(View::Keys).await;
    first
        .edit_key_filters(KeyFilters {
            status: StatusFilter::Active,
            ..KeyFilters::default()
        })
        .await;
    first.save_location().await;
    drop(first);

    let second = run(&api, &store).await;
    assert!(second.auth_state().is_authenticated());
    assert_eq!(api.call_count(Endpoint::CurrentSession), 1);
    assert_eq!(second.router().fragment(), "#/keys?status=active");
    assert_eq!(second.active_view(), Some(View::Keys));
    assert_eq!(second.range(), AnalyticsRange::Last30d);

    second.open(View::Metrics).await;
    assert_eq!(second.router().fragment(), "#/metrics?range=30d");
}

#[tokio::test]
async fn revoked_session_is_cleared_on_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let api = Arc::new(ScriptedApi::new());

    let first = run(&api, &store).await;
    first.login("owner@example.com", "long enough").await.unwrap();
    assert!(store.get(SESSION_STORE_KEY).await.unwrap().is_some());
    drop(first);

    api.expire_sessions();
    let second = run(&api, &store).await;
    assert_eq!(second.auth_state(), AuthState::Unauthenticated { notice: None });
    assert!(store.get(SESSION_STORE_KEY).await.unwrap().is_none());
    assert_eq!(second.active_view(), None);
}

#[tokio::test]
async fn key_lifecycle_through_console() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let api = Arc::new(ScriptedApi::new());
    let console = run(&api, &store).await;
    console.login("owner@example.com", "long enough").await.unwrap();
    console.open(View::Keys).await;

    assert_eq!(
        console.create_key("Billing worker", portal_core::api::Environment::Live).await,
        MutationOutcome::Completed
    );
    let created = console
        .keys()
        .state()
        .data
        .unwrap()
        .into_iter()
        .find(|k| k.label == "Billing worker")
        .unwrap();

    assert_eq!(
        console.revoke_key(&created.id, &AutoConfirm(false)).await,
        MutationOutcome::Cancelled
    );
    assert_eq!(
        console.revoke_key(&created.id, &AutoConfirm(true)).await,
        MutationOutcome::Completed
    );
    assert_eq!(console.activate_key(&created.id).await, MutationOutcome::Completed);
    assert_eq!(api.call_count(Endpoint::KeyAction), 2);

    api.expire_sessions();
    assert_eq!(console.rotate_key(&created.id).await, MutationOutcome::LoggedOut);
    assert_eq!(console.active_view(), None);
}

#[tokio::test]
async fn activity_reset_clears_route_and_refetches() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let api = Arc::new(ScriptedApi::new());
    let console = run(&api, &store).await;
    console.login("owner@example.com", "long enough").await.unwrap();

    console.open_location("#/activity?status=info").await;
    assert_eq!(console.activity_applied().status, ActivityStatus::Info);
    let events = console.activity().state().data.unwrap();
    assert!(events.iter().all(|e| e.status == "info"));

    let outcomes = console.reset_activity_filters().await;
    assert_eq!(outcomes, vec![(View::Activity, Settled::Applied)]);
    assert_eq!(console.router().fragment(), "#/activity");
    assert_eq!(console.activity().state().data.unwrap().len(), 4);
}
