//! End-to-end tests of the HTTP surface against an in-memory Telegram.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use layer_gateway::client::{ResolvedChat, SentCode};
use layer_gateway::dialogs::{DialogInfo, DialogKind};
use layer_gateway::history::{ChatRef, HistoryMessage};
use layer_gateway::{AppState, Config, Connection, Credentials, GatewayError, Result, Telegram, router};
use layer_tl_types as tl;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const CODE: &str = "12345";
const HASH: &str = "a1b2c3d4";

// ─── Fake Telegram ────────────────────────────────────────────────────────────

/// Session files hold either `pending` or `authorized`.
#[derive(Default)]
struct World {
    codes_sent:    usize,
    connections:   usize,
    history_calls: Vec<(i32, i32)>,
    dialogs:       Vec<DialogInfo>,
    messages:      Vec<HistoryMessage>,
}

#[derive(Clone, Default)]
struct FakeTelegram {
    world: Arc<Mutex<World>>,
}

struct FakeConnection {
    world:     Arc<Mutex<World>>,
    session:   PathBuf,
    signed_in: Mutex<bool>,
}

#[async_trait]
impl Telegram for FakeTelegram {
    async fn connect(&self, session: &Path, _: &Credentials) -> Result<Box<dyn Connection>> {
        self.world.lock().unwrap().connections += 1;
        let signed_in = std::fs::read_to_string(session).map(|s| s == "authorized").unwrap_or(false);
        Ok(Box::new(FakeConnection {
            world:     self.world.clone(),
            session:   session.to_path_buf(),
            signed_in: Mutex::new(signed_in),
        }))
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn is_authorized(&self) -> Result<bool> {
        Ok(*self.signed_in.lock().unwrap())
    }

    async fn send_code(&self, _: &str) -> Result<SentCode> {
        self.world.lock().unwrap().codes_sent += 1;
        Ok(SentCode::Sent { phone_code_hash: HASH.into() })
    }

    async fn sign_in(&self, _: &str, code: &str, hash: &str) -> Result<()> {
        if code != CODE || hash != HASH {
            return Err(GatewayError::InvalidCode);
        }
        *self.signed_in.lock().unwrap() = true;
        Ok(())
    }

    async fn save_session(&self) -> Result<()> {
        let state = if *self.signed_in.lock().unwrap() { "authorized" } else { "pending" };
        std::fs::write(&self.session, state)?;
        Ok(())
    }

    async fn dialogs(&self) -> Result<Vec<DialogInfo>> {
        Ok(self.world.lock().unwrap().dialogs.clone())
    }

    async fn resolve(&self, chat: &ChatRef) -> Result<Option<ResolvedChat>> {
        let world = self.world.lock().unwrap();
        let found = world.dialogs.iter().find(|d| match chat {
            ChatRef::Id(id)       => d.id == *id,
            ChatRef::Username(u)  => d.username.as_deref() == Some(u.as_str()),
            ChatRef::Name(n)      => d.name == *n || d.username.as_deref() == Some(n.as_str()),
        });
        Ok(found.map(|d| ResolvedChat { id: d.id, input: tl::enums::InputPeer::Empty }))
    }

    async fn history(&self, _: &ResolvedChat, offset_id: i32, limit: i32) -> Result<Vec<HistoryMessage>> {
        let mut world = self.world.lock().unwrap();
        world.history_calls.push((offset_id, limit));
        Ok(world.messages.iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    app:   Router,
    fake:  FakeTelegram,
    dir:   TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir  = tempfile::tempdir().unwrap();
        let fake = FakeTelegram::default();
        let mut config = Config::default();
        config.data_dir = dir.path().join("sessions");
        config.history.batch_delay_ms = 0;
        let app = router(AppState::new(Arc::new(fake.clone()), config));
        Self { app, fake, dir }
    }

    fn session_file(&self, digits: &str) -> PathBuf {
        self.dir.path().join("sessions").join(format!("session_{digits}.session"))
    }

    fn world(&self) -> std::sync::MutexGuard<'_, World> {
        self.fake.world.lock().unwrap()
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp   = self.app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes  = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value  = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn login(&self, phone: &str) {
        let (status, _) = self.send("POST", "/send_code", Some(creds(json!({ "phone_number": phone })))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = self.send("POST", "/confirm_code", Some(creds(json!({
            "phone_number": phone, "code": CODE, "phone_code_hash": HASH,
        })))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

fn creds(mut v: Value) -> Value {
    v["api_id"]   = json!(12345);
    v["api_hash"] = json!("0123456789abcdef");
    v
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn text(id: i32, date: DateTime<Utc>, body: &str) -> HistoryMessage {
    HistoryMessage { id, date, sender_id: Some(1000 + id as i64), text: body.into() }
}

fn messages_uri(channel: &str, from: &str, to: &str) -> String {
    format!(
        "/get_messages?channel_id={channel}&api_id=1&api_hash=x&phone_number=15550100&from_date={from}&to_date={to}"
    )
}

// ─── Auth ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_code_returns_hash_and_creates_session() {
    let h = Harness::new();
    let (status, body) = h.send("POST", "/send_code", Some(creds(json!({ "phone_number": "+1 555 0100" })))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "code_sent");
    assert_eq!(body["phone_code_hash"], HASH);
    assert_eq!(std::fs::read_to_string(h.session_file("15550100")).unwrap(), "pending");
}

#[tokio::test]
async fn already_authorized_sends_no_code() {
    let h = Harness::new();
    h.login("+1 555 0100").await;
    assert_eq!(h.world().codes_sent, 1);

    let (status, body) = h.send("POST", "/send_code", Some(creds(json!({ "phone_number": "15550100" })))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_authorized");
    assert!(body.get("phone_code_hash").is_none());
    assert_eq!(h.world().codes_sent, 1);
}

#[tokio::test]
async fn confirm_marks_session_authorized() {
    let h = Harness::new();
    h.login("15550100").await;
    assert_eq!(std::fs::read_to_string(h.session_file("15550100")).unwrap(), "authorized");
}

#[tokio::test]
async fn wrong_hash_leaves_session_untouched() {
    let h = Harness::new();
    h.send("POST", "/send_code", Some(creds(json!({ "phone_number": "15550100" })))).await;
    let before = std::fs::read(h.session_file("15550100")).unwrap();

    let (status, body) = h.send("POST", "/confirm_code", Some(creds(json!({
        "phone_number": "15550100", "code": CODE, "phone_code_hash": "stale",
    })))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "invalid or expired code");
    assert_eq!(std::fs::read(h.session_file("15550100")).unwrap(), before);
}

#[tokio::test]
async fn confirm_without_code_request_is_not_found() {
    let h = Harness::new();
    let (status, _) = h.send("POST", "/confirm_code", Some(creds(json!({
        "phone_number": "15550100", "code": CODE, "phone_code_hash": HASH,
    })))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.world().connections, 0);
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let h = Harness::new();
    let (status, body) = h.send("POST", "/send_code", Some(json!({ "phone_number": "15550100" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "api_id and api_hash are required");
}

#[tokio::test]
async fn malformed_phone_is_rejected() {
    let h = Harness::new();
    let (status, _) = h.send("POST", "/send_code", Some(creds(json!({ "phone_number": "../../etc" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_session_outcomes() {
    let h = Harness::new();
    let (status, body) = h.send("DELETE", "/delete_session", Some(json!({ "phone_number": "15550100" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_found");

    h.login("+1 555 0100").await;
    let (status, body) = h.send("DELETE", "/delete_session", Some(json!({ "phone_number": "+1 555 0100" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(!h.session_file("15550100").exists());
}

// ─── Dialogs ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dialogs_require_authorization() {
    let h = Harness::new();
    let (status, _) = h.send("POST", "/get_dialogs", Some(creds(json!({ "phone_number": "15550100" })))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.world().connections, 0);

    h.send("POST", "/send_code", Some(creds(json!({ "phone_number": "15550100" })))).await;
    let (status, _) = h.send("POST", "/get_dialogs", Some(creds(json!({ "phone_number": "15550100" })))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dialogs_are_listed_with_type() {
    let h = Harness::new();
    h.world().dialogs = vec![
        DialogInfo { id: -1001, name: "News".into(), kind: DialogKind::Channel, username: Some("news".into()) },
        DialogInfo { id: -1002, name: "Team".into(), kind: DialogKind::Group, username: None },
        DialogInfo { id: 42, name: "Alice".into(), kind: DialogKind::Chat, username: Some("alice".into()) },
    ];
    h.login("15550100").await;

    let (status, body) = h.send("POST", "/get_dialogs", Some(creds(json!({ "phone_number": "15550100" })))).await;
    assert_eq!(status, StatusCode::OK);
    let dialogs = body["dialogs"].as_array().unwrap();
    assert_eq!(dialogs.len(), 3);
    assert_eq!(dialogs[0], json!({ "id": -1001, "name": "News", "type": "channel", "username": "news" }));
    assert_eq!(dialogs[1]["type"], "group");
    assert_eq!(dialogs[1]["username"], Value::Null);
    assert_eq!(dialogs[2]["type"], "chat");
}

// ─── Messages ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn messages_inside_window_inclusive() {
    let h = Harness::new();
    h.world().dialogs = vec![
        DialogInfo { id: -1001, name: "News".into(), kind: DialogKind::Channel, username: Some("news".into()) },
    ];
    h.world().messages = vec![
        text(6, at(2024, 2, 1, 0), "february"),
        text(5, at(2024, 1, 31, 23), "last day"),
        text(4, at(2024, 1, 15, 12), ""),
        text(3, at(2024, 1, 15, 11), "middle"),
        text(2, at(2024, 1, 1, 0), "first day"),
        text(1, at(2023, 12, 31, 23), "december"),
    ];
    h.login("15550100").await;

    let (status, body) = h.send("GET", &messages_uri("-1001", "01/01/2024", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 3);
    let texts: Vec<&str> = body["messages"].as_array().unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["last day", "middle", "first day"]);
    assert_eq!(body["messages"][0]["date"], "2024-01-31T23:00:00+00:00");
    assert_eq!(body["messages"][0]["sender_id"], 1005);
}

#[tokio::test]
async fn messages_resolve_by_username_and_title() {
    let h = Harness::new();
    h.world().dialogs = vec![
        DialogInfo { id: -55, name: "Family".into(), kind: DialogKind::Chat, username: None },
        DialogInfo { id: -1001, name: "News".into(), kind: DialogKind::Channel, username: Some("news".into()) },
    ];
    h.world().messages = vec![text(1, at(2024, 1, 10, 9), "hello")];
    h.login("15550100").await;

    let (status, body) = h.send("GET", &messages_uri("Family", "01/01/2024", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = h.send("GET", &messages_uri("%40news", "01/01/2024", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = "/get_messages?channel_name=news&api_id=1&api_hash=x&phone_number=15550100\
               &from_date=01/01/2024&to_date=31/01/2024";
    let (status, _) = h.send("GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_chat_is_not_found() {
    let h = Harness::new();
    h.login("15550100").await;
    let (status, body) = h.send("GET", &messages_uri("nobody_here", "01/01/2024", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chat not found: nobody_here");
}

#[tokio::test]
async fn bad_date_is_rejected_before_connecting() {
    let h = Harness::new();
    let (status, body) = h.send("GET", &messages_uri("-1001", "2024-01-01", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Date must be in DD/MM/YYYY format");
    assert_eq!(h.world().connections, 0);
}

#[tokio::test]
async fn messages_require_authorization() {
    let h = Harness::new();
    let (status, _) = h.send("GET", &messages_uri("-1001", "01/01/2024", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pagination_stops_on_empty_batch_and_honours_limit() {
    let h = Harness::new();
    h.world().dialogs = vec![
        DialogInfo { id: -1001, name: "News".into(), kind: DialogKind::Channel, username: None },
    ];
    h.world().messages = (1..=150).rev().map(|id| text(id, at(2024, 1, 10, 0), "x")).collect();
    h.login("15550100").await;

    let (status, body) = h.send("GET", &messages_uri("-1001", "01/01/2024", "31/01/2024"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 150);
    assert_eq!(h.world().history_calls, vec![(0, 100), (51, 100), (1, 100)]);

    h.world().history_calls.clear();
    let uri = format!("{}&limit=120", messages_uri("-1001", "01/01/2024", "31/01/2024"));
    let (_, body) = h.send("GET", &uri, None).await;
    assert_eq!(body["count"], 120);
    assert_eq!(h.world().history_calls, vec![(0, 100), (51, 20)]);
}

// ─── Malformed input ──────────────────────────────────────────────────────────

async fn raw_send(h: &Harness, method: &str, uri: &str, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        req = req.header("content-type", ct);
    }
    let resp   = h.app.clone().oneshot(req.body(Body::from(body.to_string())).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes  = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn error_text(body: &Value) -> &str {
    body["error"].as_str().unwrap_or_else(|| panic!("expected {{\"error\": ..}}, got {body}"))
}

#[tokio::test]
async fn missing_query_field_is_a_json_error() {
    let h   = Harness::new();
    let uri = "/get_messages?channel_id=-1001&api_id=1&api_hash=x&phone_number=15550100&to_date=31/01/2024";
    let (status, body) = h.send("GET", uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("from_date"), "{body}");
}

#[tokio::test]
async fn negative_limit_is_a_json_error() {
    let h   = Harness::new();
    let uri = format!("{}&limit=-5", messages_uri("-1001", "01/01/2024", "31/01/2024"));
    let (status, body) = h.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_text(&body).is_empty());
    assert_eq!(h.world().connections, 0);
}

#[tokio::test]
async fn body_without_phone_is_a_json_error() {
    let h = Harness::new();
    let (status, body) = h.send("POST", "/send_code", Some(creds(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("phone_number"), "{body}");

    let (status, body) = h.send("POST", "/get_dialogs", Some(json!({ "api_id": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("phone_number"), "{body}");
}

#[tokio::test]
async fn unparsable_body_is_a_json_error() {
    let h = Harness::new();
    let (status, body) = raw_send(&h, "POST", "/confirm_code", Some("application/json"), "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    error_text(&body);

    let (status, body) = raw_send(&h, "DELETE", "/delete_session", None, "phone_number=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    error_text(&body);
    assert_eq!(h.world().connections, 0);
}

#[tokio::test]
async fn health_reports_data_dir() {
    let h = Harness::new();
    let (status, body) = h.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["data_dir"].as_str().unwrap().ends_with("sessions"));
}
