//! Route table

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::post;
use std::sync::Arc;

/// Bucket lifecycle routes
///
/// The root route answers with and without the trailing slash.
pub fn bucket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bucket", post(handlers::up).delete(handlers::destroy))
        .route("/bucket/", post(handlers::up).delete(handlers::destroy))
        .route("/bucket/refresh", post(handlers::refresh))
        .route("/bucket/cancel", post(handlers::cancel))
}

/// The full application router
pub fn create_app(state: Arc<AppState>) -> Router {
    bucket_routes().with_state(state)
}
