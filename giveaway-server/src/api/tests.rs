use super::*;
use crate::config::runtime::{AdminConfig, EngineConfig, ServerConfig, SharedConfig};
use crate::server::build_router;
use argon2::{
    Algorithm, Argon2, Params, PasswordHasher, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use giveaway_core::config::ServiceConfig;
use giveaway_core::entities::{
    AnnouncementRef, ChannelId, Eligibility, MessageId, TenantId, UserId,
};
use giveaway_core::gateway::{GatewayError, MessagingGateway};
use giveaway_core::scheduler::channels::ScheduleCommandReceiver;
use giveaway_core::scheduler::schedule_command_channel;
use giveaway_core::service::EventService;
use giveaway_core::store::MemoryEventStore;
use giveaway_sdk::ADMIN_AUTH_HEADER;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

const SECRET: &str = "admin-secret";

struct FakeGateway {
    next_message: AtomicU64,
    participants: Vec<UserId>,
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    fn self_id(&self) -> UserId {
        UserId(999)
    }

    async fn post_announcement(
        &self,
        channel: ChannelId,
        _content: &str,
    ) -> Result<AnnouncementRef, GatewayError> {
        let id = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AnnouncementRef {
            channel_id: channel,
            message_id: MessageId(id),
        })
    }

    async fn edit_announcement(
        &self,
        _announcement: &AnnouncementRef,
        _content: &str,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn fetch_participants(
        &self,
        _announcement: &AnnouncementRef,
    ) -> Result<Vec<UserId>, GatewayError> {
        Ok(self.participants.clone())
    }

    async fn is_eligible(
        &self,
        _tenant: TenantId,
        _user: UserId,
        _eligibility: &Eligibility,
    ) -> Result<bool, GatewayError> {
        Ok(true)
    }

    async fn send_message(
        &self,
        _channel: ChannelId,
        _content: &str,
        _reply_to: Option<&AnnouncementRef>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

struct Harness {
    router: axum::Router,
    // Keeps timer commands deliverable while the test runs.
    _commands: ScheduleCommandReceiver,
}

/// Cheap argon2 parameters; verification reads them back from the hash.
fn hash_secret(secret: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2.hash_password(secret.as_bytes(), &salt).unwrap().to_string()
}

fn harness(participants: &[u64]) -> Harness {
    let gateway = Arc::new(FakeGateway {
        next_message: AtomicU64::new(0),
        participants: participants.iter().copied().map(UserId).collect(),
    });
    let (schedule_tx, commands) = schedule_command_channel();
    let service = Arc::new(EventService::new(
        Arc::new(MemoryEventStore::new()),
        gateway,
        schedule_tx,
        ServiceConfig::default(),
    ));
    let config = SharedConfig {
        server: Arc::new(RwLock::new(ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
        })),
        admin: Arc::new(RwLock::new(AdminConfig::new(hash_secret(SECRET)))),
        engine: Arc::new(RwLock::new(EngineConfig {
            sweep_interval: Duration::from_secs(60),
            sweep_concurrency: 4,
            gateway_timeout: Duration::from_secs(10),
            max_winners: 20,
            max_duration: Duration::from_secs(7 * 24 * 60 * 60),
        })),
    };
    Harness {
        router: build_router(AppState::new(service, config)),
        _commands: commands,
    }
}

impl Harness {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(ADMIN_AUTH_HEADER, SECRET);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(&self, duration: &str, winners: i64) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/tenants/1/events",
                Some(json!({
                    "channel_id": 100,
                    "creator_id": 7,
                    "prize": "Nitro",
                    "duration": duration,
                    "winners": winners,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let h = harness(&[]);
    let response = h
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejects_missing_or_wrong_secret() {
    let h = harness(&[]);

    let response = h
        .router
        .clone()
        .oneshot(Request::get("/api/tenants/1/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .router
        .clone()
        .oneshot(
            Request::get("/api/tenants/1/events")
                .header(ADMIN_AUTH_HEADER, "not-the-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_clamps_winners_and_lists() {
    let h = harness(&[]);
    let created = h.create("1h", 500).await;
    assert_eq!(created["status"], "active");
    assert_eq!(created["winner_count"], 20);
    assert_eq!(
        created["deadline"].as_i64().unwrap() - created["created_at"].as_i64().unwrap(),
        3600
    );

    let id = created["event_id"].as_str().unwrap();
    let (status, fetched) = h.send(Method::GET, &format!("/api/events/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = h.send(Method::GET, "/api/tenants/1/events", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (_, other_tenant) = h.send(Method::GET, "/api/tenants/2/events", None).await;
    assert!(other_tenant.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_rejects_bad_duration() {
    let h = harness(&[]);
    let (status, _) = h
        .send(
            Method::POST,
            "/api/tenants/1/events",
            Some(json!({
                "channel_id": 100,
                "creator_id": 7,
                "prize": "Nitro",
                "duration": "1y",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_end_is_idempotent_then_reroll_and_cancel() {
    let h = harness(&[10, 11, 12]);
    let created = h.create("1d", 1).await;
    let id = created["event_id"].as_str().unwrap();

    let (status, first) = h.send(Method::POST, &format!("/api/events/{id}/end"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["outcome"], "completed");
    let winner = first["winners"][0].as_u64().unwrap();
    assert!([10, 11, 12].contains(&winner));

    let (_, second) = h.send(Method::POST, &format!("/api/events/{id}/end"), None).await;
    assert_eq!(second["outcome"], "already_finished");
    assert_eq!(second["status"], "ended");
    assert_eq!(second["winners"], first["winners"]);

    let (status, rerolled) = h
        .send(
            Method::POST,
            &format!("/api/events/{id}/reroll"),
            Some(json!({ "winners": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rerolled["winners"].as_array().unwrap().len(), 2);

    let (status, cancelled) = h
        .send(Method::POST, &format!("/api/events/{id}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["cancelled"], false);
    assert_eq!(cancelled["status"], "ended");
}

#[tokio::test]
async fn test_reroll_of_active_event_conflicts() {
    let h = harness(&[10]);
    let created = h.create("1h", 1).await;
    let id = created["event_id"].as_str().unwrap();

    let (status, _) = h
        .send(
            Method::POST,
            &format!("/api/events/{id}/reroll"),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let h = harness(&[]);
    let (status, _) = h
        .send(
            Method::GET,
            "/api/events/00000000-0000-7000-8000-000000000000",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_extend_pushes_deadline() {
    let h = harness(&[]);
    let created = h.create("1h", 1).await;
    let id = created["event_id"].as_str().unwrap();

    let (status, extended) = h
        .send(
            Method::POST,
            &format!("/api/events/{id}/extend"),
            Some(json!({ "by": "30m" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        extended["deadline"].as_i64().unwrap() - created["deadline"].as_i64().unwrap(),
        1800
    );

    let (status, cancelled) = h
        .send(Method::POST, &format!("/api/events/{id}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["cancelled"], true);
    assert_eq!(cancelled["status"], "cancelled");
}
