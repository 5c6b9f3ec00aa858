//! Stack lifecycle manager
//!
//! Resolves a stack identity into a configured [`StackHandle`] and runs one
//! of the four lifecycle verbs against it. State transitions are owned by the
//! provisioning engine:
//!
//! ```text
//!            up                    destroy
//!  Absent ────────► Active ───────────────► Absent
//!                   │  ▲
//!   up / refresh /  │  │ finished, failed
//!   destroy         ▼  │ or canceled (rolled back)
//!             OperationInFlight
//! ```

use crate::config::{ProviderSettings, stack_config};
use crate::error::{LifecycleError, Result};
use crate::pool::SessionPool;
use crate::spec::{ResourceSpec, validate_identity};
use crate::website::{WEBSITE_URL_OUTPUT, bucket_website};
use serde::{Deserialize, Serialize};
use sitestack_engine::{
    EngineError, PlanSummary, ProgressSink, ProvisioningEngine, StackHandle, StackIdentity,
    TracingProgress,
};
use std::str::FromStr;
use std::sync::Arc;

/// A lifecycle verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Up,
    Refresh,
    Destroy,
    Cancel,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 4] = [
        LifecycleAction::Up,
        LifecycleAction::Refresh,
        LifecycleAction::Destroy,
        LifecycleAction::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Up => "up",
            LifecycleAction::Refresh => "refresh",
            LifecycleAction::Destroy => "destroy",
            LifecycleAction::Cancel => "cancel",
        }
    }
}

impl FromStr for LifecycleAction {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| LifecycleError::UnknownAction(s.to_string()))
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one lifecycle invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleResult {
    pub action: LifecycleAction,

    /// Stack name the verb ran against
    pub stack: String,

    /// Caller-facing message
    pub message: String,

    /// Exported endpoint, set by `up`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,

    /// Resource changes, when the engine reports them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PlanSummary>,
}

/// A resolved and configured stack
#[derive(Debug, Clone)]
pub struct ManagedStack {
    pub handle: StackHandle,
    pub spec: ResourceSpec,
}

impl ManagedStack {
    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// Drives a provisioning engine through the stack lifecycle
pub struct StackLifecycleManager {
    engine: Arc<dyn ProvisioningEngine>,
    settings: ProviderSettings,
    progress: Arc<dyn ProgressSink>,
    pool: Option<SessionPool>,
}

impl StackLifecycleManager {
    pub fn new(engine: Arc<dyn ProvisioningEngine>) -> Self {
        Self {
            engine,
            settings: ProviderSettings::default(),
            progress: Arc::new(TracingProgress),
            pool: None,
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Where `up`, `refresh` and `destroy` stream their progress
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Reuse engine sessions across requests instead of re-resolving
    pub fn with_pool(mut self, pool: SessionPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn engine(&self) -> &dyn ProvisioningEngine {
        self.engine.as_ref()
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn pool(&self) -> Option<&SessionPool> {
        self.pool.as_ref()
    }

    /// Create or select the stack, bind the website program and apply config
    pub async fn resolve(
        &self,
        identity: &StackIdentity,
        spec: &ResourceSpec,
    ) -> Result<ManagedStack> {
        validate_identity(identity)?;
        spec.validate()?;
        let program = bucket_website(spec)?;

        let handle = match &self.pool {
            Some(pool) => pool
                .acquire(self.engine.as_ref(), identity, &program)
                .await
                .map_err(|source| LifecycleError::Resolve { source })?,
            None => self
                .engine
                .create_or_select_stack(identity, &program)
                .await
                .map_err(|source| LifecycleError::Resolve { source })?,
        };
        tracing::info!("Created/Selected stack {}", identity);

        let config = stack_config(&self.settings, handle.name(), spec);
        self.engine
            .set_config(&handle, &config)
            .await
            .map_err(|source| LifecycleError::Config { source })?;

        Ok(ManagedStack {
            handle,
            spec: spec.clone(),
        })
    }

    /// Run the verb named by `action`
    ///
    /// Unknown names fail before the engine is contacted.
    pub async fn run(&self, stack: &ManagedStack, action: &str) -> Result<LifecycleResult> {
        let action: LifecycleAction = action.parse()?;
        self.run_action(stack, action).await
    }

    pub async fn run_action(
        &self,
        stack: &ManagedStack,
        action: LifecycleAction,
    ) -> Result<LifecycleResult> {
        let handle = &stack.handle;
        let name = handle.name().to_string();
        let failed = |source: EngineError| LifecycleError::Operation { action, source };

        tracing::info!("Running {} on stack {}", action, handle.identity());

        let result = match action {
            LifecycleAction::Up => {
                let up = self
                    .engine
                    .up(handle, self.progress.as_ref())
                    .await
                    .map_err(failed)?;
                let url = up
                    .outputs
                    .get(WEBSITE_URL_OUTPUT)
                    .and_then(|output| output.as_str())
                    .ok_or_else(|| LifecycleError::MissingOutput {
                        stack: name.clone(),
                        output: WEBSITE_URL_OUTPUT.to_string(),
                    })?
                    .to_string();
                tracing::info!(
                    "Update of {} finished in {}ms ({})",
                    name,
                    up.duration_ms,
                    up.summary
                );
                LifecycleResult {
                    action,
                    message: format!("Website URL: {}", url),
                    website_url: Some(url),
                    summary: Some(up.summary),
                    stack: name,
                }
            }
            LifecycleAction::Refresh => {
                let refreshed = self
                    .engine
                    .refresh(handle, self.progress.as_ref())
                    .await
                    .map_err(failed)?;
                LifecycleResult {
                    action,
                    message: format!("Stack refreshed successfully: {}", name),
                    website_url: None,
                    summary: Some(refreshed.summary),
                    stack: name,
                }
            }
            LifecycleAction::Destroy => {
                let destroyed = self
                    .engine
                    .destroy(handle, self.progress.as_ref())
                    .await
                    .map_err(failed)?;
                if let Some(pool) = &self.pool {
                    pool.forget(handle.identity());
                }
                LifecycleResult {
                    action,
                    message: format!("Stack successfully destroyed: {}", name),
                    website_url: None,
                    summary: Some(destroyed.summary),
                    stack: name,
                }
            }
            LifecycleAction::Cancel => {
                self.engine.cancel(handle).await.map_err(failed)?;
                LifecycleResult {
                    action,
                    message: format!("Stack successfully canceled: {}", name),
                    website_url: None,
                    summary: None,
                    stack: name,
                }
            }
        };

        tracing::info!("{}", result.message);
        Ok(result)
    }

    /// Resolve then run, rejecting unknown actions up front
    pub async fn execute(
        &self,
        identity: &StackIdentity,
        spec: &ResourceSpec,
        action: &str,
    ) -> Result<LifecycleResult> {
        let action: LifecycleAction = action.parse()?;
        let stack = self.resolve(identity, spec).await?;
        self.run_action(&stack, action).await
    }

    /// Release pooled sessions past their idle TTL
    pub async fn evict_idle(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.evict_idle(self.engine.as_ref()).await,
            None => 0,
        }
    }

    /// Release every pooled session
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown(self.engine.as_ref()).await;
        }
    }
}
