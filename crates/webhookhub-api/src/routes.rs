use std::path::Path;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::state::AppState;
use crate::{channels, dashboard, ingest, webhooks};

/// Webhook intake, shared by both listeners. The key check runs as route
/// middleware so unauthenticated bodies are never decoded.
fn webhook_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/webhook/{slug}", post(ingest::receive_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
}

/// The listener meant to be exposed publicly: intake and health only.
pub fn ingest_router(state: AppState) -> Router {
    Router::new()
        .merge(webhook_routes(&state))
        .route("/health", get(dashboard::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Intake plus the dashboard API, and the static dashboard when
/// `static_dir` is set.
pub fn dashboard_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/channels/{slug}", put(channels::update_channel).delete(channels::delete_channel))
        .route("/webhooks", get(webhooks::list_webhooks).delete(webhooks::clear_webhooks))
        .route("/webhooks/{id}", get(webhooks::get_webhook).delete(webhooks::delete_webhook))
        .route("/stats", get(dashboard::get_stats))
        .route("/settings", get(dashboard::get_settings).post(dashboard::update_settings))
        .route("/cleanup", post(dashboard::run_cleanup))
        .route("/notification-status", get(dashboard::notification_status))
        .route("/test", post(dashboard::send_test));

    let app = Router::new()
        .merge(webhook_routes(&state))
        .route("/health", get(dashboard::health))
        .nest("/api", api);

    let app = match static_dir {
        Some(dir) => app.fallback_service(
            ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html"))),
        ),
        None => app.route("/", get(dashboard::placeholder)),
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
