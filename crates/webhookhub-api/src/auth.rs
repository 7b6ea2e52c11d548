use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "token";

/// Rejects the request before its body is read unless it carries the
/// pre-shared key in `X-API-Key` or the `token` query parameter.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = header_key(&req).is_some_and(|key| keys_match(key, &state.api_key))
        || query_key(&req).is_some_and(|key| keys_match(&key, &state.api_key));

    if authorized {
        Ok(next.run(req).await)
    } else {
        warn!("Rejected webhook with invalid API key: {}", req.uri().path());
        Err(ApiError::Unauthorized)
    }
}

fn header_key(req: &Request) -> Option<&str> {
    req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

fn query_key(req: &Request) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(req.uri()).ok()?;
    params.remove(API_KEY_QUERY)
}

/// Length-independent comparison of two keys.
fn keys_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0 && !expected.is_empty()
}
