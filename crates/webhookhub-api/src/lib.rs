pub mod auth;
pub mod channels;
pub mod cleanup;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod routes;
pub mod state;
pub mod webhooks;

pub use error::ApiError;
pub use routes::{dashboard_router, ingest_router};
pub use state::{AppState, AppStateInner};
