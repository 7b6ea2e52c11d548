use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;
use webhookhub_db::DbError;

/// Every handler error, rendered as `{"detail": ...}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid API key")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<DbError>() {
            Some(DbError::Conflict(slug)) => Self::Conflict(format!("Channel '{slug}' already exists")),
            Some(DbError::InvalidSetting { key, value }) => {
                Self::BadRequest(format!("Invalid value for {key}: {value:?}"))
            }
            None => Self::Storage(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = match &self {
            Self::Storage(e) => {
                error!("Storage error: {:#}", e);
                "Internal server error".to_string()
            }
            Self::Internal => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_client_statuses() {
        let conflict: ApiError = anyhow::Error::new(DbError::Conflict("plex".into())).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.to_string(), "Channel 'plex' already exists");

        let invalid: ApiError = anyhow::Error::new(DbError::InvalidSetting {
            key: "cleanup_days".into(),
            value: "0".into(),
        })
        .into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let other: ApiError = anyhow::anyhow!("disk full").into();
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
