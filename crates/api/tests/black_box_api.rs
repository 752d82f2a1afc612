use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use authreplica_api::app::services::AppServices;
use authreplica_api::config::AppConfig;
use authreplica_auth::{LoginPolicy, RefreshClaims};
use authreplica_core::IdentityId;
use authreplica_events::{Delivery, EventBus};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(LoginPolicy::default()).await
    }

    async fn spawn_with(login_policy: LoginPolicy) -> Self {
        // Same router as prod, in-memory store and bus, ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            jwt_secret_is_default: false,
            login_policy,
            ..AppConfig::default()
        };
        let (app, services) = authreplica_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    fn publish(&self, event: serde_json::Value) {
        let bus = self.services.event_bus().expect("in-memory bus");
        bus.publish(Delivery::new(
            authreplica_events::USER_EVENTS_TOPIC,
            serde_json::to_vec(&event).unwrap(),
        ))
        .unwrap();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn digest(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

async fn login(client: &reqwest::Client, base_url: &str, user: &str, pw: &str) -> reqwest::Response {
    client
        .post(format!("{}/auth/login", base_url))
        .json(&json!({ "user_name": user, "password": pw }))
        .send()
        .await
        .unwrap()
}

async fn login_eventually(client: &reqwest::Client, base_url: &str, user: &str, pw: &str) -> serde_json::Value {
    // The replica is eventually consistent with the event stream.
    for _ in 0..100 {
        let res = login(client, base_url, user, pw).await;
        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("user did not become loginable within timeout");
}

async fn whoami(client: &reqwest::Client, base_url: &str, token: &str) -> reqwest::Response {
    client
        .get(format!("{}/auth/whoami", base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn projected_user_can_log_in() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.publish(json!({
        "event": "user.created",
        "payload": { "user_name": "alice", "password": digest("pw"), "blocked": false, "scopes": ["read"] }
    }));

    let tokens = login_eventually(&client, &srv.base_url, "alice", "pw").await;
    let access = tokens["access_token"].as_str().unwrap();
    assert!(!tokens["refresh_token"].as_str().unwrap().is_empty());

    let res = whoami(&client, &srv.base_url, access).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["scopes"], json!(["read"]));
    assert_eq!(body["blocked"], json!(false));
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.publish(json!({
        "event": "user.created",
        "payload": { "user_name": "alice", "password": digest("pw"), "blocked": false }
    }));
    login_eventually(&client, &srv.base_url, "alice", "pw").await;

    let wrong = login(&client, &srv.base_url, "alice", "nope").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong: serde_json::Value = wrong.json().await.unwrap();

    let missing = login(&client, &srv.base_url, "nobody", "pw").await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let missing: serde_json::Value = missing.json().await.unwrap();

    assert_eq!(wrong, missing);
    assert_eq!(wrong["error"], "invalid_credentials");
}

#[tokio::test]
async fn login_validates_the_body() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = login(&client, &srv.base_url, "", "pw").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/auth/login", srv.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn refresh_reflects_scopes_granted_after_login() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.publish(json!({
        "event": "user.created",
        "payload": { "user_name": "alice", "password": digest("pw"), "blocked": false, "scopes": [] }
    }));
    let tokens = login_eventually(&client, &srv.base_url, "alice", "pw").await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    srv.publish(json!({
        "event": "user.added_scope",
        "payload": { "user_name": "alice", "scope": "write" }
    }));

    for _ in 0..100 {
        let res = client
            .post(format!("{}/auth/refresh", srv.base_url))
            .bearer_auth(&refresh_token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        let access = body["access_token"].as_str().unwrap();

        let me: serde_json::Value = whoami(&client, &srv.base_url, access).await.json().await.unwrap();
        if me["scopes"] == json!(["write"]) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("refreshed token never carried the new scope");
}

#[tokio::test]
async fn refresh_rejects_access_tokens_and_garbage() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.publish(json!({
        "event": "user.created",
        "payload": { "user_name": "alice", "password": digest("pw"), "blocked": false }
    }));
    let tokens = login_eventually(&client, &srv.base_url, "alice", "pw").await;

    for bearer in [tokens["access_token"].as_str().unwrap(), "not-a-jwt"] {
        let res = client
            .post(format!("{}/auth/refresh", srv.base_url))
            .bearer_auth(bearer)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_stops_once_the_user_is_blocked_under_reject_policy() {
    let srv = TestServer::spawn_with(LoginPolicy {
        reject_blocked: true,
    })
    .await;
    let client = reqwest::Client::new();

    srv.publish(json!({
        "event": "user.created",
        "payload": { "user_name": "alice", "password": digest("pw"), "blocked": false }
    }));
    let tokens = login_eventually(&client, &srv.base_url, "alice", "pw").await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    srv.publish(json!({
        "event": "user.updated",
        "payload": { "user_name": "alice", "blocked": true }
    }));

    for _ in 0..100 {
        let res = client
            .post(format!("{}/auth/refresh", srv.base_url))
            .bearer_auth(&refresh_token)
            .send()
            .await
            .unwrap();
        if res.status() == StatusCode::FORBIDDEN {
            let body: serde_json::Value = res.json().await.unwrap();
            assert_eq!(body["error"], "user_blocked");
            return;
        }
        assert_eq!(res.status(), StatusCode::OK);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("blocked user could still refresh");
}

#[tokio::test]
async fn expired_refresh_token_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let now = Utc::now();
    let claims = RefreshClaims {
        sub: IdentityId::new(1),
        iat: (now - ChronoDuration::days(8)).timestamp(),
        exp: (now - ChronoDuration::days(1)).timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt");

    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_requires_an_access_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/auth/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleted_user_can_no_longer_log_in() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    srv.publish(json!({
        "event": "user.created",
        "payload": { "user_name": "alice", "password": digest("pw"), "blocked": false }
    }));
    login_eventually(&client, &srv.base_url, "alice", "pw").await;

    srv.publish(json!({ "event": "user.deleted", "payload": { "user_name": "alice" } }));

    for _ in 0..100 {
        if login(&client, &srv.base_url, "alice", "pw").await.status() == StatusCode::UNAUTHORIZED {
            srv.services.shutdown().await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("deleted user could still log in");
}
