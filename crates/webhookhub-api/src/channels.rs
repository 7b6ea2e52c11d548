use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use webhookhub_types::api::{ChannelUpdate, CreateChannelRequest};
use webhookhub_types::models::is_valid_slug;

use crate::error::ApiError;
use crate::state::AppState;

const PUSHOVER_PRIORITY_RANGE: std::ops::RangeInclusive<i32> = -2..=2;

pub async fn list_channels(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let channels = state.blocking(|db| db.list_channels()).await?;
    Ok(Json(channels))
}

pub async fn create_channel(
    State(state): State<AppState>,
    body: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(mut req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    req.slug = req.slug.trim().to_lowercase().replace(' ', "-");
    if !is_valid_slug(&req.slug) {
        return Err(ApiError::BadRequest(format!("Invalid channel slug: {:?}", req.slug)));
    }
    check_pushover_priority(req.pushover_priority)?;

    let channel = state.blocking(move |db| db.create_channel(&req)).await?;
    info!("Created channel '{}'", channel.slug);
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn update_channel(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Result<Json<ChannelUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_pushover_priority(update.pushover_priority.flatten())?;

    let lookup = slug.clone();
    let channel = state
        .blocking(move |db| db.update_channel(&lookup, &update))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Channel '{slug}' not found")))?;
    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = slug.clone();
    let removed = state
        .blocking(move |db| db.delete_channel(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Channel '{slug}' not found")))?;

    info!("Deleted channel '{}' and {} webhooks", slug, removed);
    Ok(Json(json!({
        "status": "deleted",
        "slug": slug,
        "webhooks_deleted": removed,
    })))
}

fn check_pushover_priority(priority: Option<i32>) -> Result<(), ApiError> {
    match priority {
        Some(p) if !PUSHOVER_PRIORITY_RANGE.contains(&p) => Err(ApiError::BadRequest(format!(
            "pushover_priority must be between -2 and 2, got {p}"
        ))),
        _ => Ok(()),
    }
}
