mod common;

use common::{MockApi, Reply, fresh_token};
use pretty_assertions::assert_eq;
use sentinel_auth::{
    AuthorizedClient, CredentialPair, CredentialStore, HttpAuthApi, RenewalCoordinator,
    SessionManager, SessionPhase,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signed_in(access: &str) -> CredentialStore {
    let store = CredentialStore::in_memory();
    store
        .set_pair(&CredentialPair::new(access, "refresh-1"))
        .unwrap();
    store
}

fn sessions_body() -> serde_json::Value {
    json!({
        "sessions": [
            {"sessionId": "sess-1", "isCurrent": true, "browser": "Firefox", "os": "Linux"},
            {"sessionId": "sess-2", "isCurrent": false}
        ]
    })
}

#[tokio::test]
async fn unauthorized_request_renews_and_retries_once() {
    let server = MockServer::start().await;
    let stale = fresh_token("user-1");
    let renewed = fresh_token("user-1-renewed");

    Mock::given(method("GET"))
        .and(path("/sessions"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"status": "error", "message": "Token expired"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": renewed})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .and(header("authorization", format!("Bearer {renewed}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(sessions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let store = signed_in(&stale);
    let api = HttpAuthApi::new(server.uri()).unwrap();
    let coordinator = Arc::new(RenewalCoordinator::new(Arc::new(api.clone()), store.clone()));
    let manager = SessionManager::new(coordinator.clone());
    let client = AuthorizedClient::from_api(&api, coordinator.clone());

    let sessions = client.list_sessions().await.unwrap();

    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].is_current);
    assert_eq!(sessions[1].session_id, "sess-2");
    assert_eq!(store.access_token(), Some(renewed.clone()));
    assert_eq!(coordinator.current_access_token(), Some(renewed));
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn failed_reactive_renewal_propagates_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/sessions/others"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"status": "error", "message": "Token expired"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"status": "error", "message": "Invalid refresh token"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = signed_in(&fresh_token("user-1"));
    let api = HttpAuthApi::new(server.uri()).unwrap();
    let coordinator = Arc::new(RenewalCoordinator::new(Arc::new(api.clone()), store.clone()));
    let manager = SessionManager::new(coordinator.clone());
    let client = AuthorizedClient::from_api(&api, coordinator);

    let err = client.revoke_other_sessions().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.user_message(), "Token expired");
    assert_eq!(store.access_token(), None);
    assert_eq!(store.refresh_token(), None);
    assert_eq!(manager.state().phase, SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn successful_request_needs_no_renewal() {
    let server = MockServer::start().await;
    let access = fresh_token("user-1");
    Mock::given(method("DELETE"))
        .and(path("/sessions/sess-9"))
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Session revoked", "deletedCount": 1})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = MockApi::new();
    let coordinator = Arc::new(RenewalCoordinator::new(api.clone(), signed_in(&access)));
    let _manager = SessionManager::new(coordinator.clone());
    let client = AuthorizedClient::new(reqwest::Client::new(), server.uri(), coordinator);

    let response = client.revoke_session("sess-9").await.unwrap();
    assert_eq!(response.message, "Session revoked");
    assert_eq!(response.deleted_count, Some(1));
    assert_eq!(api.refresh_count(), 0);
}

#[tokio::test]
async fn request_waits_for_renewal_already_in_flight() {
    let server = MockServer::start().await;
    let stale = fresh_token("user-1");
    let renewed = fresh_token("user-1-renewed");
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .and(header("authorization", format!("Bearer {renewed}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(sessions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let api = MockApi::new();
    api.reply_to_refresh(Reply::Access(renewed.clone()));
    let gate = api.gate_refresh();
    let coordinator = Arc::new(RenewalCoordinator::new(api.clone(), signed_in(&stale)));
    let _manager = SessionManager::new(coordinator.clone());
    let client = AuthorizedClient::new(reqwest::Client::new(), server.uri(), coordinator.clone());

    let in_flight = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.renew().await })
    };
    while !coordinator.is_renewing() {
        tokio::task::yield_now().await;
    }

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        gate.notify_one();
    });

    let sessions = client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(api.refresh_count(), 1);

    in_flight.await.unwrap();
    release.await.unwrap();
}

#[tokio::test]
async fn fact_request_renews_and_retries_once() {
    let server = MockServer::start().await;
    let stale = fresh_token("user-1");
    let renewed = fresh_token("user-1-renewed");

    Mock::given(method("GET"))
        .and(path("/facts"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": renewed})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/facts"))
        .and(header("authorization", format!("Bearer {renewed}").as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"Tip": {"index": 7, "tip": "Sign out of devices you no longer use."}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = signed_in(&stale);
    let api = HttpAuthApi::new(server.uri()).unwrap();
    let coordinator = Arc::new(RenewalCoordinator::new(Arc::new(api.clone()), store.clone()));
    let _manager = SessionManager::new(coordinator.clone());
    let client = AuthorizedClient::from_api(&api, coordinator);

    let fact = client.get_fact().await.unwrap();

    assert_eq!(fact.tip.index, 7);
    assert_eq!(fact.tip.tip, "Sign out of devices you no longer use.");
    assert_eq!(store.access_token(), Some(renewed));
}

#[tokio::test]
async fn sessions_with_fractional_offsets_are_listed() {
    let server = MockServer::start().await;
    let access = fresh_token("user-1");
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessions": [{"sessionId": "s1", "isCurrent": true, "offset": 19800.0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = MockApi::new();
    let coordinator = Arc::new(RenewalCoordinator::new(api.clone(), signed_in(&access)));
    let _manager = SessionManager::new(coordinator.clone());
    let client = AuthorizedClient::new(reqwest::Client::new(), server.uri(), coordinator);

    let sessions = client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].offset, Some(19800.0));
}
