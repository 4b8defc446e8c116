//! Integration test: authentication state fan-out, plus an end-to-end pass
//! through the OAuth redirect and the OpenDAL-backed store.

mod common;

use bytes::Bytes;
use opendal::Operator;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use common::ScriptedStore;
use pixsync_core::config::AuthConfig;
use pixsync_core::types::ThumbnailSpec;
use pixsync_core::AuthState;
use pixsync_storage::{AuthOutcome, OpendalStore, RemoteStore, SessionManager};
use pixsync_sync::{AuthTracker, CacheLimits, FileService, TransferOptions};

fn record(tracker: &AuthTracker) -> (Arc<Mutex<Vec<AuthState>>>, pixsync_sync::ListenerHandle) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = tracker.subscribe(move |state| sink.lock().unwrap().push(*state));
    (seen, handle)
}

#[test]
fn subscribe_replays_current_state_once() {
    let store = ScriptedStore::new();
    let tracker = AuthTracker::new(store.clone());
    let (seen, _) = record(&tracker);
    assert_eq!(*seen.lock().unwrap(), vec![AuthState::Authenticated]);

    let store = ScriptedStore::unauthenticated();
    let tracker = AuthTracker::new(store.clone());
    let (seen, _) = record(&tracker);
    assert_eq!(*seen.lock().unwrap(), vec![AuthState::Unauthenticated]);
}

#[test]
fn change_during_replay_is_redelivered() {
    let store = ScriptedStore::new();
    let tracker = AuthTracker::new(store.clone());

    // The session drops while the replay is being handled, before the
    // listener is registered for notifications.
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let remote = store.clone();
    tracker.subscribe(move |state| {
        sink.lock().unwrap().push(*state);
        remote.invalidate_session();
    });

    assert_eq!(
        *seen.lock().unwrap(),
        vec![AuthState::Authenticated, AuthState::Unauthenticated]
    );
}

#[test]
fn replay_goes_only_to_the_new_listener() {
    let store = ScriptedStore::new();
    let tracker = AuthTracker::new(store.clone());
    let (first, _) = record(&tracker);
    let (second, _) = record(&tracker);
    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[test]
fn success_notifies_authenticated() {
    let store = ScriptedStore::unauthenticated();
    let tracker = AuthTracker::new(store.clone());
    let (seen, _) = record(&tracker);

    store.link();
    tracker.handle_auth_outcome(AuthOutcome::Success);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![AuthState::Unauthenticated, AuthState::Authenticated]
    );
}

#[test]
fn cancel_and_error_force_sign_out() {
    let store = ScriptedStore::new();
    let tracker = AuthTracker::new(store.clone());
    let (seen, _) = record(&tracker);

    tracker.handle_auth_outcome(AuthOutcome::Cancel);
    assert!(store.authorized_session().is_none());

    store.link();
    tracker.handle_auth_outcome(AuthOutcome::Error {
        description: "invalid_scope".into(),
    });
    assert!(store.authorized_session().is_none());

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            AuthState::Authenticated,
            AuthState::Unauthenticated,
            AuthState::Unauthenticated,
        ]
    );
}

#[test]
fn sign_out_is_idempotent() {
    let store = ScriptedStore::new();
    let tracker = AuthTracker::new(store.clone());
    let (seen, _) = record(&tracker);

    tracker.sign_out();
    tracker.sign_out();

    assert_eq!(tracker.current_state(), AuthState::Unauthenticated);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            AuthState::Authenticated,
            AuthState::Unauthenticated,
            AuthState::Unauthenticated,
        ]
    );
}

#[test]
fn unsubscribed_listener_hears_nothing() {
    let store = ScriptedStore::new();
    let tracker = AuthTracker::new(store.clone());
    let (seen, handle) = record(&tracker);

    tracker.unsubscribe(handle);
    tracker.sign_out();

    assert_eq!(seen.lock().unwrap().len(), 1, "only the replay");
}

fn memory_service(sessions: Arc<SessionManager>) -> FileService {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    let store: Arc<dyn RemoteStore> = Arc::new(OpendalStore::new(op, sessions));
    let limits = CacheLimits {
        max_bytes: 1024 * 1024,
        max_entries: 0,
        ttl: None,
    };
    FileService::new(store, limits, limits, ThumbnailSpec::default())
}

#[tokio::test]
async fn redirect_login_then_round_trip() {
    let cfg = AuthConfig {
        app_key: "app".into(),
        ..AuthConfig::default()
    };
    let sessions = Arc::new(SessionManager::new(&cfg));
    let svc = memory_service(sessions.clone());

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    svc.auth().subscribe(move |s| sink.lock().unwrap().push(*s));

    // Before login every remote call is an authentication error
    let err = svc
        .list_files("", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.description(), "Authentication Error");

    let authorize = sessions.authorize_url().unwrap();
    let state = url_param(&authorize, "state");
    let redirect = format!(
        "{}#access_token=tok&token_type=bearer&account_id=dbid%3A1&state={state}",
        cfg.redirect_uri
    );
    let outcome = sessions.handle_redirect_url(&redirect).unwrap();
    assert_eq!(outcome, AuthOutcome::Success);
    svc.handle_auth_outcome(outcome);
    assert_eq!(svc.auth_state(), AuthState::Authenticated);

    svc.upload(Bytes::from_static(b"pixels"), "/Photos/A.jpg", TransferOptions::new())
        .await
        .unwrap();
    let files = svc
        .list_files("/photos", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path.as_deref(), Some("/photos/a.jpg"));

    let data = svc
        .fetch_file("/photos/a.jpg", TransferOptions::new())
        .await
        .unwrap();
    assert_eq!(data, Bytes::from_static(b"pixels"));

    svc.sign_out();
    assert!(sessions.authorized_session().is_none());
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            AuthState::Unauthenticated,
            AuthState::Authenticated,
            AuthState::Unauthenticated,
        ]
    );
}

#[tokio::test]
async fn denied_redirect_keeps_signed_out() {
    let sessions = Arc::new(SessionManager::new(&AuthConfig::default()));
    let svc = memory_service(sessions.clone());

    let redirect = format!(
        "{}#error=access_denied&error_description=user+declined",
        AuthConfig::default().redirect_uri
    );
    let outcome = sessions.handle_redirect_url(&redirect).unwrap();
    assert_eq!(outcome, AuthOutcome::Cancel);
    svc.handle_auth_outcome(outcome);
    assert_eq!(svc.auth_state(), AuthState::Unauthenticated);
}

fn url_param(raw: &str, key: &str) -> String {
    raw.split(['?', '&'])
        .find_map(|kv| kv.strip_prefix(&format!("{key}=")))
        .unwrap()
        .to_string()
}
