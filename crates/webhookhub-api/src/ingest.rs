use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Path, Query, State},
    http::{Extensions, HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};
use webhookhub_ingest::{Overrides, decode_body};
use webhookhub_notify::DispatchReport;
use webhookhub_types::api::IngestResponse;
use webhookhub_types::models::{ChannelPrefs, NotificationRecord, is_valid_slug};

use crate::error::ApiError;
use crate::state::AppState;

/// Headers never persisted with a record.
const REDACTED_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie"];

/// `POST /webhook/{slug}`: normalize, store, and fan out in the background.
/// Responds as soon as the record is stored.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(overrides): Query<Overrides>,
    extensions: Extensions,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if !is_valid_slug(&slug) {
        return Err(ApiError::BadRequest(format!("Invalid channel slug: {slug:?}")));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let payload = decode_body(content_type, &body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut draft = state.normalizer.normalize(&slug, &payload, &overrides);
    draft.source_ip = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    draft.received_headers = recorded_headers(&headers);

    let record = state
        .blocking(move |db| db.insert_webhook(&draft, Utc::now()))
        .await?;

    info!(
        "Webhook {} received on '{}' ({}): {}",
        record.id, record.channel_slug, record.priority, record.title
    );

    let response = IngestResponse {
        status: "ok".into(),
        id: record.id,
        channel: record.channel_slug.clone(),
    };
    spawn_dispatch(&state, record);

    Ok((StatusCode::CREATED, Json(response)))
}

/// Queues delivery on the state's task tracker so shutdown can wait for it.
pub fn spawn_dispatch(state: &AppState, record: NotificationRecord) {
    let task_state = state.clone();
    state.tracker.spawn(async move {
        deliver(&task_state, &record).await;
    });
}

/// Dispatches one stored record with its channel's preferences and writes
/// the Pushover result back to the store.
pub async fn deliver(state: &AppState, record: &NotificationRecord) -> DispatchReport {
    let slug = record.channel_slug.clone();
    let prefs = match state.blocking(move |db| db.get_channel(&slug)).await {
        Ok(Some(channel)) => channel.prefs(),
        Ok(None) => ChannelPrefs::fallback(&record.channel_slug),
        Err(e) => {
            warn!("Loading channel '{}' for dispatch failed: {}", record.channel_slug, e);
            ChannelPrefs::fallback(&record.channel_slug)
        }
    };

    let report = state.dispatcher.dispatch(record, &prefs).await;
    debug!("Dispatch of webhook {}: {:?}", record.id, report.outcomes);

    if let Some(sent) = report.pushover_sent() {
        let id = record.id;
        if let Err(e) = state.blocking(move |db| db.mark_pushover_sent(id, sent)).await {
            warn!("Recording pushover status of webhook {} failed: {}", id, e);
        }
    }
    report
}

fn recorded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut recorded: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if REDACTED_HEADERS.contains(&name) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes());
        recorded
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    recorded
}
