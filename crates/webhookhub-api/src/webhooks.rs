use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use webhookhub_types::api::{BulkDeleteQuery, WebhookFilter};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_webhooks(
    State(state): State<AppState>,
    query: Result<Query<WebhookFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(filter) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let page = state.blocking(move |db| db.query_webhooks(&filter)).await?;
    Ok(Json(page))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let record = state
        .blocking(move |db| db.get_webhook(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Webhook {id} not found")))?;
    Ok(Json(record))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if !state.blocking(move |db| db.delete_webhook(id)).await? {
        return Err(ApiError::NotFound(format!("Webhook {id} not found")));
    }
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

/// `DELETE /api/webhooks?channel=&older_than=`; with no filter every record
/// goes.
pub async fn clear_webhooks(
    State(state): State<AppState>,
    query: Result<Query<BulkDeleteQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(q) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let deleted = state
        .blocking(move |db| db.delete_webhooks(q.channel.as_deref(), q.older_than))
        .await?;

    info!("Cleared {} webhooks", deleted);
    Ok(Json(json!({ "status": "cleared", "deleted": deleted })))
}
