#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;
use webhookhub_api::{AppState, AppStateInner, dashboard_router, ingest_router};
use webhookhub_db::Database;
use webhookhub_ingest::Normalizer;
use webhookhub_notify::{Backend, Dispatcher, NotifyError};
use webhookhub_types::models::{ChannelPrefs, NotificationRecord};

pub const API_KEY: &str = "test-key";

/// Records every delivery instead of calling a real service.
pub struct RecordingBackend {
    name: &'static str,
    fail: bool,
    push_gated: bool,
    sent: Mutex<Vec<(NotificationRecord, ChannelPrefs)>>,
}

impl RecordingBackend {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: false,
            push_gated: name == "pushover",
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: true,
            push_gated: false,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(NotificationRecord, ChannelPrefs)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn accepts(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> bool {
        !self.push_gated || (record.push_enabled && prefs.pushover_enabled)
    }

    async fn send(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((record.clone(), prefs.clone()));
        if self.fail {
            Err(NotifyError::unavailable(self.name, "connection refused"))
        } else {
            Ok(())
        }
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub ingest: Router,
    pub dashboard: Router,
    pub pushover: Arc<RecordingBackend>,
    pub discord: Arc<RecordingBackend>,
    pub smtp: Arc<RecordingBackend>,
}

impl TestContext {
    /// Waits for every background dispatch spawned so far.
    pub async fn drain(&self) {
        self.state.tracker.close();
        self.state.tracker.wait().await;
        self.state.tracker.reopen();
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }
}

pub fn build_test_context() -> TestContext {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&temp_dir.path().join("webhookhub.db")).unwrap());

    let pushover = RecordingBackend::new("pushover");
    let discord = RecordingBackend::new("discord");
    let smtp = RecordingBackend::failing("smtp");
    let backends: Vec<Arc<dyn Backend>> = vec![pushover.clone(), discord.clone(), smtp.clone()];

    let state = AppStateInner::new(db, Normalizer::default(), Dispatcher::new(backends), API_KEY);

    TestContext {
        temp_dir,
        ingest: ingest_router(state.clone()),
        dashboard: dashboard_router(state.clone(), None),
        state,
        pushover,
        discord,
        smtp,
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

pub fn post_webhook(uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::post(uri)
        .header("x-api-key", API_KEY)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}
