use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{Html, IntoResponse},
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use webhookhub_types::api::TestRequest;
use webhookhub_types::models::{DraftRecord, Enrichment, Priority, is_valid_slug};

use crate::error::ApiError;
use crate::ingest::deliver;
use crate::state::AppState;

const TEST_CHANNEL: &str = "general";
const TEST_TITLE: &str = "Test Notification";
const TEST_MESSAGE: &str = "This is a test from WebhookHub!";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Served at `/` when no static dashboard directory is configured.
pub async fn placeholder() -> Html<&'static str> {
    Html("<h1>WebhookHub</h1><p>Dashboard not found. Set WEBHOOKHUB_STATIC_DIR to serve it.</p>")
}

pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let today = Utc::now().date_naive();
    let stats = state.blocking(move |db| db.stats(today)).await?;
    Ok(Json(stats))
}

pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let settings = state.blocking(|db| db.get_settings()).await?;
    Ok(Json(settings))
}

/// Accepts a JSON object; scalar values are stored as text, unknown keys
/// are ignored.
pub async fn update_settings(
    State(state): State<AppState>,
    body: Result<Json<BTreeMap<String, Value>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut values = BTreeMap::new();
    for (key, value) in body {
        let text = match value {
            Value::String(s) => s,
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(ApiError::BadRequest(format!("Setting '{key}' must be a scalar")));
            }
        };
        values.insert(key, text);
    }

    let updated = state.blocking(move |db| db.update_settings(&values)).await?;
    Ok(Json(json!({ "status": "saved", "updated": updated })))
}

/// Manual retention sweep, run even when scheduled cleanup is disabled.
pub async fn run_cleanup(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.sweeper.run_now(Utc::now()).await.map_err(ApiError::from)?;
    info!("Manual cleanup deleted {} webhooks", report.deleted);
    Ok(Json(report))
}

pub async fn notification_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.status().await)
}

/// Stores a synthetic webhook and waits for its dispatch so the dashboard
/// can show each backend's outcome.
pub async fn send_test(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: TestRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TestRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let slug = req.channel.unwrap_or_else(|| TEST_CHANNEL.to_string());
    if !is_valid_slug(&slug) {
        return Err(ApiError::BadRequest(format!("Invalid channel slug: {slug:?}")));
    }

    let draft = DraftRecord {
        channel_slug: slug,
        title: req.title.unwrap_or_else(|| TEST_TITLE.to_string()),
        message: req.message.unwrap_or_else(|| TEST_MESSAGE.to_string()),
        priority: req.priority.unwrap_or(Priority::Normal),
        push_enabled: true,
        enrichment: Enrichment::default(),
        source_ip: Some("dashboard".to_string()),
        raw_payload: json!({}),
        received_headers: BTreeMap::new(),
    };
    let record = state
        .blocking(move |db| db.insert_webhook(&draft, Utc::now()))
        .await?;

    let report = deliver(&state, &record).await;
    info!("Test notification {} dispatched to {} backends", record.id, report.outcomes.len());

    Ok(Json(json!({
        "status": "sent",
        "id": record.id,
        "pushover_sent": report.pushover_sent(),
        "outcomes": report.outcomes,
    })))
}
