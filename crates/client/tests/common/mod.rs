//! Shared fixtures for session integration tests

#![allow(dead_code)]

use keyway_client::Session;
use keyway_core::{CredentialStore, Credentials, KeyValueStorage, MemoryStorage, User};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STALE_TOKEN: &str = "access-stale";
pub const FRESH_TOKEN: &str = "access-fresh";
pub const REFRESH_TOKEN: &str = "refresh-1";

pub fn user() -> User {
    User {
        id: "u-1".to_string(),
        username: "ada".to_string(),
        email: "u@x.com".to_string(),
    }
}

pub fn user_json() -> Value {
    json!({ "id": "u-1", "username": "ada", "email": "u@x.com" })
}

/// Storage holding a complete session
pub fn seeded_storage(access_token: &str, refresh_token: Option<&str>) -> MemoryStorage {
    let storage = MemoryStorage::new();
    CredentialStore::new(Arc::new(storage.clone()))
        .commit(&Credentials::new(
            access_token,
            refresh_token.map(str::to_string),
            user(),
        ))
        .unwrap();
    storage
}

pub fn session(server: &MockServer, storage: &MemoryStorage) -> Session {
    Session::builder()
        .base_url(server.uri())
        .storage(storage.clone())
        .build()
        .unwrap()
}

/// Session restored from storage with a stale access token and a refresh token
pub fn logged_in(server: &MockServer) -> (Session, MemoryStorage) {
    let storage = seeded_storage(STALE_TOKEN, Some(REFRESH_TOKEN));
    (session(server, &storage), storage)
}

pub fn stored(storage: &MemoryStorage, key: &str) -> Option<String> {
    storage.get(key).unwrap()
}

/// Refresh endpoint answering with `access_token` after `delay`
pub async fn mount_refresh(
    server: &MockServer,
    access_token: &str,
    delay: Duration,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": REFRESH_TOKEN })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": access_token }))
                .set_delay(delay),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Refresh endpoint rejecting the refresh token after `delay`
pub async fn mount_refresh_rejected(server: &MockServer, delay: Duration, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("refresh token expired")
                .set_delay(delay),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}
