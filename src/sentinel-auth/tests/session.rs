mod common;

use common::{MockApi, RecordingNavigator, Reply, fresh_token, session_token};
use pretty_assertions::assert_eq;
use sentinel_auth::{
    AuthError, CredentialPair, CredentialStore, Destination, RenewalCoordinator, SessionManager,
    SessionPhase,
};
use std::sync::Arc;

struct Harness {
    api: Arc<MockApi>,
    store: CredentialStore,
    navigator: RecordingNavigator,
    manager: SessionManager,
}

fn harness(store: CredentialStore) -> Harness {
    let api = MockApi::new();
    let navigator = RecordingNavigator::default();
    let coordinator = RenewalCoordinator::new(api.clone(), store.clone())
        .with_navigator(Arc::new(navigator.clone()));
    let manager = SessionManager::new(Arc::new(coordinator));
    Harness {
        api,
        store,
        navigator,
        manager,
    }
}

fn signed_in(access: &str) -> CredentialStore {
    let store = CredentialStore::in_memory();
    store
        .set_pair(&CredentialPair::new(access, "refresh-1"))
        .unwrap();
    store
}

#[tokio::test]
async fn bootstrap_restores_stored_session() {
    let access = session_token("user-7", "sess-7", chrono::Utc::now().timestamp() + 3600);
    let h = harness(signed_in(&access));

    let state = h.manager.state();
    assert_eq!(state.phase, SessionPhase::Authenticated);
    let identity = state.identity.unwrap();
    assert_eq!(identity.subject_id, "user-7");
    assert_eq!(identity.email, "user-7@example.com");
    assert_eq!(identity.session_id.as_deref(), Some("sess-7"));
    assert!(h.manager.coordinator().has_proactive_check());
    assert!(h.navigator.destinations().is_empty());
}

#[tokio::test]
async fn bootstrap_without_both_credentials_is_unauthenticated() {
    let store = CredentialStore::in_memory();
    store.set_access(&fresh_token("user-7")).unwrap();
    let h = harness(store);

    assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
    assert!(!h.manager.coordinator().has_proactive_check());
}

#[tokio::test]
async fn bootstrap_keeps_session_with_unreadable_credential() {
    let h = harness(signed_in("opaque"));

    let state = h.manager.state();
    assert!(state.is_authenticated());
    assert!(state.identity.is_none());
    assert!(!h.manager.coordinator().has_proactive_check());
}

#[tokio::test]
async fn login_persists_credentials_and_navigates() {
    let h = harness(CredentialStore::in_memory());
    let access = fresh_token("user-1");
    h.api.reply_to_auth(Reply::Credentials {
        access: access.clone(),
        refresh: "refresh-1".to_string(),
    });

    h.manager.login("user-1@example.com", "pw").await.unwrap();

    assert_eq!(h.store.access_token(), Some(access));
    assert_eq!(h.store.refresh_token(), Some("refresh-1".to_string()));
    assert!(h.manager.is_authenticated());
    assert_eq!(h.manager.identity().unwrap().subject_id, "user-1");
    assert!(h.manager.coordinator().has_proactive_check());
    assert_eq!(h.navigator.destinations(), vec![Destination::Authenticated]);
}

#[tokio::test]
async fn rejected_login_leaves_store_untouched() {
    let h = harness(CredentialStore::in_memory());
    h.api
        .reply_to_auth(Reply::Status(401, "Invalid credentials".to_string()));

    let err = h.manager.login("user-1@example.com", "wrong").await.unwrap_err();

    match err {
        AuthError::AuthFailure { message } => assert_eq!(message, "Invalid credentials"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.store.refresh_token(), None);
    assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
    assert!(h.navigator.destinations().is_empty());
}

#[tokio::test]
async fn unreachable_server_reports_generic_failure() {
    let h = harness(CredentialStore::in_memory());
    h.api.reply_to_auth(Reply::Unreachable);

    let err = h.manager.login("user-1@example.com", "pw").await.unwrap_err();
    assert_eq!(err.to_string(), "Unable to reach the server");
    assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn register_establishes_session() {
    let h = harness(CredentialStore::in_memory());
    h.api.reply_to_auth(Reply::Credentials {
        access: fresh_token("user-2"),
        refresh: "refresh-2".to_string(),
    });

    h.manager
        .register("Ada", "user-2@example.com", "pw")
        .await
        .unwrap();

    assert_eq!(h.api.register_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(h.manager.is_authenticated());
    assert_eq!(h.store.refresh_token(), Some("refresh-2".to_string()));
}

#[tokio::test]
async fn logout_revokes_current_session() {
    let access = session_token("user-3", "sess-3", chrono::Utc::now().timestamp() + 3600);
    let h = harness(signed_in(&access));

    h.manager.logout().await;

    assert_eq!(
        h.api.revocations.lock().clone(),
        vec![(access, "sess-3".to_string())]
    );
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
    assert!(!h.manager.coordinator().has_proactive_check());
    assert_eq!(h.navigator.destinations(), vec![Destination::Entry]);
}

#[tokio::test]
async fn logout_clears_store_when_revocation_fails() {
    let access = session_token("user-3", "sess-3", chrono::Utc::now().timestamp() + 3600);
    let h = harness(signed_in(&access));
    h.api.reply_to_revoke(Reply::Unreachable);

    h.manager.logout().await;

    assert_eq!(h.api.revocations.lock().len(), 1);
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.store.refresh_token(), None);
    assert_eq!(h.manager.state().phase, SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn logout_without_session_id_skips_revocation() {
    let h = harness(signed_in(&fresh_token("user-4")));

    h.manager.logout().await;

    assert!(h.api.revocations.lock().is_empty());
    assert_eq!(h.store.access_token(), None);
}

#[tokio::test]
async fn protected_view_requires_session() {
    let h = harness(CredentialStore::in_memory());

    let err = h.manager.require_authenticated().await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
    assert_eq!(h.navigator.destinations(), vec![Destination::Entry]);

    let h = harness(signed_in(&fresh_token("user-5")));
    let state = h.manager.require_authenticated().await.unwrap();
    assert_eq!(state.identity.unwrap().subject_id, "user-5");
}

#[tokio::test]
async fn state_changes_are_observable() {
    let h = harness(CredentialStore::in_memory());
    h.api.reply_to_auth(Reply::Credentials {
        access: fresh_token("user-6"),
        refresh: "refresh-6".to_string(),
    });
    let mut receiver = h.manager.subscribe();

    h.manager.login("user-6@example.com", "pw").await.unwrap();
    assert!(receiver.has_changed().unwrap());
    assert!(receiver.borrow_and_update().is_authenticated());

    h.manager.logout().await;
    assert_eq!(receiver.borrow_and_update().phase, SessionPhase::Unauthenticated);
}
