//! End-to-end checks of the desk API against a fake roster plugin.

use api_lib::{
    adapters::{DbAdapter, HttpRosterAdapter},
    config::Config,
    web::{
        router,
        state::{AppState, DeskRegistry},
    },
};
use attendance_core::{PortError, RosterService, SystemClock};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use reqwest::{header, Client};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const KEY: &str = "campus-secret";

//=========================================================================================
// Fake roster plugin
//=========================================================================================

#[derive(Default)]
struct Plugin {
    snapshot: Option<Value>,
    reject_fetch: bool,
    uploads: Vec<Value>,
    keys_seen: Vec<String>,
}

type Shared = Arc<Mutex<Plugin>>;

fn record_key(plugin: &Shared, headers: &HeaderMap) -> bool {
    let key = headers
        .get("x-sync-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ok = key == KEY;
    plugin.lock().unwrap().keys_seen.push(key);
    ok
}

async fn data(State(plugin): State<Shared>, headers: HeaderMap) -> (StatusCode, String) {
    if !record_key(&plugin, &headers) {
        return (StatusCode::UNAUTHORIZED, "bad key".into());
    }
    let guard = plugin.lock().unwrap();
    if guard.reject_fetch {
        return (StatusCode::FORBIDDEN, "revoked".into());
    }
    let body = guard.snapshot.as_ref().map(Value::to_string).unwrap_or_default();
    (StatusCode::OK, body)
}

async fn attendance(
    State(plugin): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    if !record_key(&plugin, &headers) {
        return (StatusCode::UNAUTHORIZED, "bad key".into());
    }
    plugin.lock().unwrap().uploads.push(body);
    (StatusCode::OK, String::new())
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_plugin(snapshot: Option<Value>) -> (String, Shared) {
    let plugin: Shared = Arc::new(Mutex::new(Plugin {
        snapshot,
        ..Default::default()
    }));
    let app = Router::new()
        .route("/plugin/data", get(data))
        .route("/plugin/attendance", post(attendance))
        .with_state(plugin.clone());
    let base = spawn(app).await;
    (format!("{}/plugin", base), plugin)
}

fn school() -> Value {
    json!({
        "students": [
            { "studentId": 101, "studentName": "Asha Verma", "class": 1 },
            { "studentId": "102", "studentName": "Ben Ortiz" }
        ],
        "teachers": [ { "id": 7, "name": "Mrs. Khan", "subject": "Physics" } ],
        "classes": [ { "id": 1, "class_name": "Grade 5" } ]
    })
}

//=========================================================================================
// Desk API harness
//=========================================================================================

struct Desk {
    base: String,
    client: Client,
    cookie: String,
}

impl Desk {
    async fn start(roster_url: &str) -> Self {
        let lookup_url = roster_url.to_string();
        let config = Config::from_lookup(move |key| match key {
            "ROSTER_API_URL" => Some(lookup_url.clone()),
            "REQUEST_TIMEOUT_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = Arc::new(DbAdapter::new(pool));
        db.run_migrations().await.unwrap();
        let roster = Arc::new(HttpRosterAdapter::new(roster_url, config.request_timeout).unwrap());

        let state = Arc::new(AppState {
            accounts: db,
            roster,
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
            desks: Arc::new(DeskRegistry::default()),
        });
        let base = spawn(router(state).unwrap()).await;
        let client = Client::new();

        let response = client
            .post(format!("{}/auth/signup", base))
            .json(&json!({ "email": "office@school.test", "password": "correct horse" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = session_from(&response);

        Self { base, client, cookie }
    }

    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base, path))
            .header(header::COOKIE, &self.cookie);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        let text = response.text().await.unwrap();
        let value = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, value)
    }

    async fn set_key(&self) {
        let (status, _) = self
            .call(reqwest::Method::PUT, "/settings/sync-key", Some(json!({ "key": KEY })))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    async fn scan(&self, payload: Value) -> (StatusCode, Value) {
        self.call(
            reqwest::Method::POST,
            "/scan",
            Some(json!({ "decoded_text": payload.to_string() })),
        )
        .await
    }
}

fn session_from(response: &reqwest::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn adapter_sends_the_key_and_reads_the_snapshot() {
    let (url, plugin) = spawn_plugin(Some(school())).await;
    let adapter = HttpRosterAdapter::new(&url, Duration::from_secs(5)).unwrap();

    let snapshot = adapter.fetch_roster(KEY).await.unwrap();
    assert_eq!(snapshot.students.len(), 2);
    assert_eq!(snapshot.students[0].student_id, "101");
    assert_eq!(snapshot.students[0].class.as_deref(), Some("1"));
    assert_eq!(snapshot.teachers[0].id, "7");
    assert_eq!(plugin.lock().unwrap().keys_seen, vec![KEY.to_string()]);
}

#[tokio::test]
async fn adapter_treats_an_empty_body_as_an_empty_roster() {
    let (url, _plugin) = spawn_plugin(None).await;
    let adapter = HttpRosterAdapter::new(&url, Duration::from_secs(5)).unwrap();

    let snapshot = adapter.fetch_roster(KEY).await.unwrap();
    assert!(snapshot.students.is_empty());
    assert!(snapshot.teachers.is_empty());
    assert!(snapshot.classes.is_empty());
}

#[tokio::test]
async fn adapter_maps_a_rejected_key_to_unauthorized() {
    let (url, _plugin) = spawn_plugin(Some(school())).await;
    let adapter = HttpRosterAdapter::new(&url, Duration::from_secs(5)).unwrap();

    let err = adapter.fetch_roster("wrong").await.unwrap_err();
    assert!(matches!(err, PortError::Unauthorized));
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let (url, _plugin) = spawn_plugin(Some(school())).await;
    let desk = Desk::start(&url).await;

    let response = desk
        .client
        .get(format!("{}/roster", desk.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, me) = desk.call(reqwest::Method::GET, "/me", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "superuser");
}

#[tokio::test]
async fn sync_without_a_key_sends_nothing() {
    let (url, plugin) = spawn_plugin(Some(school())).await;
    let desk = Desk::start(&url).await;

    let (status, body) = desk.call(reqwest::Method::POST, "/sync", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "auth_error");
    assert!(plugin.lock().unwrap().keys_seen.is_empty());
}

#[tokio::test]
async fn synced_desk_marks_students_once_and_uploads_each_scan() {
    let (url, plugin) = spawn_plugin(Some(school())).await;
    let desk = Desk::start(&url).await;
    desk.set_key().await;

    let (status, summary) = desk.call(reqwest::Method::POST, "/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["students"], 2);
    assert_eq!(summary["teachers"], 1);

    let (status, welcome) = desk.scan(json!({ "id": "101", "name": "Asha Verma" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(welcome["message"], "Welcome, Asha Verma!");

    let (status, body) = desk.scan(json!({ "id": "101", "name": "Asha Verma" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate");

    let (status, body) = desk.scan(json!({ "id": "999", "name": "Stranger" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (_, ledger) = desk.call(reqwest::Method::GET, "/attendance/students", None).await;
    assert_eq!(ledger.as_array().map(Vec::len), Some(1));

    let uploads = plugin.lock().unwrap().uploads.clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0]["students"][0]["id"], "101");
}

#[tokio::test]
async fn teacher_scan_shows_up_in_the_grid() {
    let (url, _plugin) = spawn_plugin(Some(school())).await;
    let desk = Desk::start(&url).await;
    desk.set_key().await;
    desk.call(reqwest::Method::POST, "/sync", None).await;

    let (status, welcome) = desk
        .scan(json!({ "id": "7", "name": "Mrs. Khan", "type": "teacher" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(welcome["kind"], "teacher");

    let (_, log) = desk.call(reqwest::Method::GET, "/attendance/teachers/log", None).await;
    assert_eq!(log.as_array().map(Vec::len), Some(1));

    let (_, grid) = desk.call(reqwest::Method::GET, "/attendance/teachers", None).await;
    assert_eq!(grid[0]["status"], "Present");
    assert!(grid[0]["comment"].as_str().unwrap_or_default().starts_with("Scanned at"));
}

#[tokio::test]
async fn failed_sync_keeps_the_previous_roster() {
    let (url, plugin) = spawn_plugin(Some(school())).await;
    let desk = Desk::start(&url).await;
    desk.set_key().await;
    desk.call(reqwest::Method::POST, "/sync", None).await;

    plugin.lock().unwrap().reject_fetch = true;
    let (status, _) = desk.call(reqwest::Method::POST, "/sync", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, roster) = desk.call(reqwest::Method::GET, "/roster", None).await;
    assert_eq!(roster["students"].as_array().map(Vec::len), Some(2));

    let (status, _) = desk.scan(json!({ "id": "102", "name": "Ben Ortiz" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_ends_the_session_and_forgets_the_ledger() {
    let (url, _plugin) = spawn_plugin(Some(school())).await;
    let desk = Desk::start(&url).await;
    desk.set_key().await;
    desk.call(reqwest::Method::POST, "/sync", None).await;
    desk.scan(json!({ "id": "101", "name": "Asha Verma" })).await;

    let (status, _) = desk.call(reqwest::Method::POST, "/auth/logout", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = desk.call(reqwest::Method::GET, "/attendance/students", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = desk
        .client
        .post(format!("{}/auth/login", desk.base))
        .json(&json!({ "email": "office@school.test", "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = Desk {
        base: desk.base.clone(),
        client: desk.client.clone(),
        cookie: session_from(&response),
    };

    let (_, ledger) = fresh.call(reqwest::Method::GET, "/attendance/students", None).await;
    assert_eq!(ledger.as_array().map(Vec::len), Some(0));
    let (_, roster) = fresh.call(reqwest::Method::GET, "/roster", None).await;
    assert_eq!(roster["students"].as_array().map(Vec::len), Some(0));
}
