//! Shared handler state

use crate::response::{ApiError, DispatchError};
use crate::settings::ErrorMode;
use sitestack_core::StackLifecycleManager;
use sitestack_engine::StackIdentity;
use std::sync::Arc;

/// Resolved once at startup and shared by every request
pub struct AppState {
    pub manager: Arc<StackLifecycleManager>,

    /// The stack every request targets
    pub identity: StackIdentity,

    pub error_mode: ErrorMode,
}

impl AppState {
    pub fn new(
        manager: Arc<StackLifecycleManager>,
        identity: StackIdentity,
        error_mode: ErrorMode,
    ) -> Self {
        Self {
            manager,
            identity,
            error_mode,
        }
    }

    /// Render `error` the way this daemon is configured to
    pub fn reject(&self, error: impl Into<DispatchError>) -> ApiError {
        ApiError::new(error, self.error_mode)
    }
}
