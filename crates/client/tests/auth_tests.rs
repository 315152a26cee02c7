//! Login, logout and session restoration

mod common;

use common::*;
use keyway_client::{ClientError, RefreshError, RequestDescriptor, Session, SessionState};
use keyway_core::{KeyValueStorage, MemoryStorage};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer, status: u16, expected_calls: u64) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": STALE_TOKEN,
            "refreshToken": REFRESH_TOKEN,
            "user": user_json()
        }))
    } else {
        ResponseTemplate::new(status).set_body_string("Invalid credentials")
    };

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(template)
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_slow_login(server: &MockServer, delay: Duration, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "accessToken": FRESH_TOKEN,
                    "refreshToken": "refresh-2",
                    "user": user_json()
                }))
                .set_delay(delay),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_logout(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(body_json(json!({ "refreshToken": REFRESH_TOKEN })))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_success_persists_session() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 200, 1).await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.subscribe(move |state| sink.lock().unwrap().push(state.clone()));

    assert!(session.login("u@x.com", "pw").await);

    assert_eq!(session.state(), SessionState::Authenticated(user()));
    assert_eq!(stored(&storage, "accessToken").as_deref(), Some(STALE_TOKEN));
    assert_eq!(stored(&storage, "refreshToken").as_deref(), Some(REFRESH_TOKEN));
    let persisted: serde_json::Value =
        serde_json::from_str(&stored(&storage, "user").unwrap()).unwrap();
    assert_eq!(persisted, user_json());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![SessionState::Authenticating, SessionState::Authenticated(user())]
    );
}

#[tokio::test]
async fn test_login_rejected_returns_false() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 401, 1).await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    assert!(!session.login("u@x.com", "wrong").await);
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_login_transport_error_returns_false() {
    // Nothing listens on this port once the server is dropped
    let uri = {
        let mock_server = MockServer::start().await;
        mock_server.uri()
    };
    let storage = MemoryStorage::new();
    let session = Session::builder()
        .base_url(uri)
        .timeout(Duration::from_secs(2))
        .storage(storage.clone())
        .build()
        .unwrap();

    assert!(!session.login("u@x.com", "pw").await);
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_concurrent_login_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "accessToken": STALE_TOKEN,
                    "refreshToken": REFRESH_TOKEN,
                    "user": user_json()
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    let (first, second) = tokio::join!(session.login("u@x.com", "pw"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.login("u@x.com", "pw").await
    });

    assert!(first);
    assert!(!second);
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_logout_clears_and_notifies_server() {
    let mock_server = MockServer::start().await;
    mount_logout(&mock_server, 204, 1).await;

    let (session, storage) = logged_in(&mock_server);
    session.logout().await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(storage.is_empty());

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(
        received[0].headers.get("authorization").unwrap(),
        STALE_TOKEN
    );
}

#[tokio::test]
async fn test_logout_without_session_makes_no_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    let notified = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&notified);
    session.subscribe(move |_| *counter.lock().unwrap() += 1);

    session.logout().await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(*notified.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_logout_twice_notifies_server_once() {
    let mock_server = MockServer::start().await;
    mount_logout(&mock_server, 204, 1).await;

    let (session, storage) = logged_in(&mock_server);
    session.logout().await;
    session.logout().await;

    assert!(storage.is_empty());
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_logout_notification_failure_is_not_fatal() {
    let mock_server = MockServer::start().await;
    mount_logout(&mock_server, 500, 1).await;

    let (session, storage) = logged_in(&mock_server);
    session.logout().await;

    assert!(storage.is_empty());
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_login_while_authenticated_replaces_session() {
    let mock_server = MockServer::start().await;
    mount_logout(&mock_server, 204, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": FRESH_TOKEN,
            "refreshToken": "refresh-2",
            "user": { "id": "u-2", "username": "grace", "email": "g@x.com" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (session, storage) = logged_in(&mock_server);

    assert!(session.login("g@x.com", "pw").await);

    assert_eq!(session.user().unwrap().username, "grace");
    assert_eq!(stored(&storage, "accessToken").as_deref(), Some(FRESH_TOKEN));
    assert_eq!(stored(&storage, "refreshToken").as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_session_restored_from_storage() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", STALE_TOKEN))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (session, _storage) = logged_in(&mock_server);

    assert_eq!(session.state(), SessionState::Authenticated(user()));
    let response = session
        .send(RequestDescriptor::get("/api/me"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_incomplete_storage_is_discarded() {
    let mock_server = MockServer::start().await;

    let storage = MemoryStorage::new();
    storage.set("accessToken", STALE_TOKEN).unwrap();
    storage.set("refreshToken", REFRESH_TOKEN).unwrap();

    let session = session(&mock_server, &storage);

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_corrupt_user_record_is_discarded() {
    let mock_server = MockServer::start().await;

    let storage = MemoryStorage::new();
    storage.set("accessToken", STALE_TOKEN).unwrap();
    storage.set("user", "{not json").unwrap();

    let session = session(&mock_server, &storage);

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let mock_server = MockServer::start().await;
    mount_logout(&mock_server, 204, 1).await;

    let (first, first_storage) = logged_in(&mock_server);
    let (second, second_storage) = logged_in(&mock_server);

    first.logout().await;

    assert!(!first.is_authenticated());
    assert!(first_storage.is_empty());
    assert!(second.is_authenticated());
    assert!(!second_storage.is_empty());
}

#[tokio::test]
async fn test_overlapping_relogin_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_slow_login(&mock_server, Duration::from_millis(100), 1).await;

    let (session, storage) = logged_in(&mock_server);

    let (first, second) = tokio::join!(session.login("u@x.com", "pw"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.login("u@x.com", "pw").await
    });

    assert!(first);
    assert!(!second);
    assert_eq!(session.state(), SessionState::Authenticated(user()));
    assert_eq!(stored(&storage, "accessToken").as_deref(), Some(FRESH_TOKEN));
    assert_eq!(stored(&storage, "refreshToken").as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_login_after_dropped_login_succeeds() {
    let mock_server = MockServer::start().await;
    mount_slow_login(&mock_server, Duration::from_millis(200), 2).await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        session.login("u@x.com", "pw"),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(session.state(), SessionState::Authenticating);

    assert!(session.login("u@x.com", "pw").await);
    assert_eq!(session.state(), SessionState::Authenticated(user()));
}

#[tokio::test]
async fn test_logout_during_login_discards_result() {
    let mock_server = MockServer::start().await;
    mount_slow_login(&mock_server, Duration::from_millis(300), 1).await;
    mount_logout(&mock_server, 204, 0).await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.subscribe(move |state| sink.lock().unwrap().push(state.clone()));

    let (logged_in, ()) = tokio::join!(session.login("u@x.com", "pw"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.logout().await;
    });

    assert!(!logged_in);
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(storage.is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![SessionState::Authenticating, SessionState::Unauthenticated]
    );
}

#[tokio::test]
async fn test_refresh_failure_during_login_keeps_new_session() {
    let mock_server = MockServer::start().await;
    mount_slow_login(&mock_server, Duration::from_millis(300), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let storage = MemoryStorage::new();
    let session = session(&mock_server, &storage);

    let (logged_in, request) = tokio::join!(session.login("u@x.com", "pw"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.send(RequestDescriptor::get("/api/data")).await
    });

    assert!(matches!(
        request,
        Err(ClientError::SessionExpired(RefreshError::MissingRefreshToken))
    ));
    assert!(logged_in);
    assert_eq!(session.state(), SessionState::Authenticated(user()));
    assert_eq!(stored(&storage, "accessToken").as_deref(), Some(FRESH_TOKEN));
}

#[tokio::test]
async fn test_credentials_snapshot_follows_session() {
    let mock_server = MockServer::start().await;
    mount_logout(&mock_server, 204, 1).await;

    let (session, _storage) = logged_in(&mock_server);

    let credentials = session.credentials();
    assert_eq!(credentials.access_token.as_deref(), Some(STALE_TOKEN));
    assert_eq!(credentials.user, Some(user()));

    session.logout().await;
    assert!(session.credentials().is_empty());
}
