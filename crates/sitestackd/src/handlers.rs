//! Bucket handlers
//!
//! Each route decodes the body into a `ResourceSpec`, resolves the configured
//! stack and runs one lifecycle verb. A body that does not decode is rejected
//! before the lifecycle manager sees it.

use crate::response::{ApiResult, MessageResponse};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use sitestack_core::{LifecycleAction, ResourceSpec};
use std::sync::Arc;

/// POST /bucket/
pub async fn up(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<MessageResponse>> {
    dispatch(&state, LifecycleAction::Up, &body).await
}

/// DELETE /bucket/
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<MessageResponse>> {
    dispatch(&state, LifecycleAction::Destroy, &body).await
}

/// POST /bucket/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<MessageResponse>> {
    dispatch(&state, LifecycleAction::Refresh, &body).await
}

/// POST /bucket/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<MessageResponse>> {
    dispatch(&state, LifecycleAction::Cancel, &body).await
}

async fn dispatch(
    state: &AppState,
    action: LifecycleAction,
    body: &[u8],
) -> ApiResult<Json<MessageResponse>> {
    let spec: ResourceSpec = serde_json::from_slice(body).map_err(|e| state.reject(e))?;
    tracing::debug!(%action, bucket = %spec.bucket_name, "Dispatching request");

    let stack = state
        .manager
        .resolve(&state.identity, &spec)
        .await
        .map_err(|e| state.reject(e))?;
    let result = state
        .manager
        .run_action(&stack, action)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(MessageResponse::new(result.message)))
}
