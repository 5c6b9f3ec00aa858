//! Lifecycle manager against the in-memory engine

use async_trait::async_trait;
use serde_json::{Value, json};
use sitestack_core::website::{ACCESS_BLOCK, BUCKET, INDEX, POLICY, WEBSITE_URL_OUTPUT};
use sitestack_core::{
    ErrorKind, LifecycleAction, LifecycleError, ProviderSettings, ResourceSpec, SessionPool,
    StackLifecycleManager, spec_from_config,
};
use sitestack_engine::{
    ConfigMap, EngineError, MemoryEngine, NoProgress, OperationResult, OutputValue, ProgressSink,
    ProvisioningEngine, ResourceGraph, Result, StackHandle, StackIdentity, StackStatus, UpResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn identity() -> StackIdentity {
    StackIdentity::new("sitestack", "dev")
}

fn spec() -> ResourceSpec {
    ResourceSpec::new("my-bucket", "hi")
}

fn manager(engine: Arc<MemoryEngine>) -> StackLifecycleManager {
    StackLifecycleManager::new(engine).with_progress(Arc::new(NoProgress))
}

/// Records every engine call before delegating to the memory engine
#[derive(Default)]
struct CountingEngine {
    inner: MemoryEngine,
    calls: AtomicUsize,
}

impl CountingEngine {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProvisioningEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    async fn create_or_select_stack(
        &self,
        identity: &StackIdentity,
        program: &ResourceGraph,
    ) -> Result<StackHandle> {
        self.touch();
        self.inner.create_or_select_stack(identity, program).await
    }

    async fn install_program(&self, stack: &StackHandle, program: &ResourceGraph) -> Result<()> {
        self.touch();
        self.inner.install_program(stack, program).await
    }

    async fn set_config(&self, stack: &StackHandle, config: &ConfigMap) -> Result<()> {
        self.touch();
        self.inner.set_config(stack, config).await
    }

    async fn up(&self, stack: &StackHandle, progress: &dyn ProgressSink) -> Result<UpResult> {
        self.touch();
        self.inner.up(stack, progress).await
    }

    async fn refresh(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        self.touch();
        self.inner.refresh(stack, progress).await
    }

    async fn destroy(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        self.touch();
        self.inner.destroy(stack, progress).await
    }

    async fn cancel(&self, stack: &StackHandle) -> Result<()> {
        self.touch();
        self.inner.cancel(stack).await
    }
}

/// Memory engine whose `up` reports a rewritten website output
struct RewrittenOutput {
    inner: MemoryEngine,
    website_url: Option<Value>,
}

#[async_trait]
impl ProvisioningEngine for RewrittenOutput {
    fn name(&self) -> &str {
        "rewritten-output"
    }

    async fn create_or_select_stack(
        &self,
        identity: &StackIdentity,
        program: &ResourceGraph,
    ) -> Result<StackHandle> {
        self.inner.create_or_select_stack(identity, program).await
    }

    async fn install_program(&self, stack: &StackHandle, program: &ResourceGraph) -> Result<()> {
        self.inner.install_program(stack, program).await
    }

    async fn set_config(&self, stack: &StackHandle, config: &ConfigMap) -> Result<()> {
        self.inner.set_config(stack, config).await
    }

    async fn up(&self, stack: &StackHandle, progress: &dyn ProgressSink) -> Result<UpResult> {
        let mut result = self.inner.up(stack, progress).await?;
        result.outputs.remove(WEBSITE_URL_OUTPUT);
        if let Some(value) = &self.website_url {
            result
                .outputs
                .insert(WEBSITE_URL_OUTPUT.to_string(), OutputValue::new(value.clone()));
        }
        Ok(result)
    }

    async fn refresh(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        self.inner.refresh(stack, progress).await
    }

    async fn destroy(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        self.inner.destroy(stack, progress).await
    }

    async fn cancel(&self, stack: &StackHandle) -> Result<()> {
        self.inner.cancel(stack).await
    }
}

/// Collects progress lines
#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl ProgressSink for Recorder {
    fn line(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

#[tokio::test]
async fn test_up_returns_website_url() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone());

    let stack = manager.resolve(&identity(), &spec()).await.unwrap();
    let result = manager.run(&stack, "up").await.unwrap();

    assert_eq!(result.action, LifecycleAction::Up);
    assert_eq!(
        result.message,
        "Website URL: my-bucket.s3-website-us-east-1.amazonaws.com"
    );
    assert_eq!(
        result.website_url.as_deref(),
        Some("my-bucket.s3-website-us-east-1.amazonaws.com")
    );
    assert_eq!(result.summary.unwrap().create, 4);
    assert_eq!(engine.status(&identity()), StackStatus::Active);
}

#[tokio::test]
async fn test_up_is_idempotent() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone());

    let first = manager.execute(&identity(), &spec(), "up").await.unwrap();
    let state_before = engine.state(&identity()).unwrap();

    let second = manager.execute(&identity(), &spec(), "up").await.unwrap();
    let state_after = engine.state(&identity()).unwrap();

    assert_eq!(first.message, second.message);
    let summary = second.summary.unwrap();
    assert!(!summary.has_changes());
    assert_eq!(summary.same, 4);
    assert_eq!(state_before.resources, state_after.resources);
}

#[tokio::test]
async fn test_changed_message_updates_only_the_index() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone());

    manager.execute(&identity(), &spec(), "up").await.unwrap();
    let result = manager
        .execute(&identity(), &ResourceSpec::new("my-bucket", "bye"), "up")
        .await
        .unwrap();

    let summary = result.summary.unwrap();
    assert_eq!(summary.update, 1);
    assert_eq!(summary.same, 3);
    assert_eq!(summary.create, 0);
}

#[tokio::test]
async fn test_policy_applied_after_access_block() {
    let engine = Arc::new(MemoryEngine::new());
    let recorder = Arc::new(Recorder::default());
    let manager = StackLifecycleManager::new(engine).with_progress(recorder.clone());

    manager.execute(&identity(), &spec(), "up").await.unwrap();

    let lines = recorder.0.lock().unwrap().clone();
    let position = |name: &str| {
        lines
            .iter()
            .position(|l| l.contains(name) && l.contains("create"))
            .unwrap()
    };
    assert!(position(BUCKET) < position(ACCESS_BLOCK));
    assert!(position(ACCESS_BLOCK) < position(POLICY));
}

#[tokio::test]
async fn test_missing_or_mistyped_website_url_fails_up() {
    for website_url in [None, Some(json!(42))] {
        let engine = Arc::new(RewrittenOutput {
            inner: MemoryEngine::new(),
            website_url,
        });
        let manager = StackLifecycleManager::new(engine).with_progress(Arc::new(NoProgress));

        let result = manager.execute(&identity(), &spec(), "up").await;
        let Err(err) = result else {
            panic!("up succeeded without a usable website url");
        };
        assert!(matches!(
            err,
            LifecycleError::MissingOutput { ref output, .. } if output == WEBSITE_URL_OUTPUT
        ));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

#[tokio::test]
async fn test_message_with_interpolation_is_stored_verbatim() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone());

    for message in ["price is ${price}", "leak ${site-bucket.arn}"] {
        manager
            .execute(&identity(), &ResourceSpec::new("my-bucket", message), "up")
            .await
            .unwrap();

        let state = engine.state(&identity()).unwrap();
        let content: String = state
            .get_resource(INDEX)
            .unwrap()
            .get_attribute("content")
            .unwrap();
        assert!(content.contains(&format!("Your custom message is = {} ", message)));
        assert!(!content.contains("arn:aws:s3"));
    }
}

#[tokio::test]
async fn test_destroy_after_up_then_destroy_again() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone());

    manager.execute(&identity(), &spec(), "up").await.unwrap();

    let destroyed = manager
        .execute(&identity(), &spec(), "destroy")
        .await
        .unwrap();
    assert_eq!(destroyed.message, "Stack successfully destroyed: dev");
    assert_eq!(destroyed.summary.unwrap().delete, 4);
    assert_eq!(engine.status(&identity()), StackStatus::Absent);

    let again = manager
        .execute(&identity(), &spec(), "destroy")
        .await
        .unwrap();
    assert_eq!(again.message, "Stack successfully destroyed: dev");
    assert!(!again.summary.unwrap().has_changes());
    assert_eq!(engine.status(&identity()), StackStatus::Absent);
}

#[tokio::test]
async fn test_refresh_reports_drift() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone());

    manager.execute(&identity(), &spec(), "up").await.unwrap();
    assert!(engine.remove_remote(&identity(), POLICY));

    let result = manager
        .execute(&identity(), &spec(), "refresh")
        .await
        .unwrap();
    assert_eq!(result.message, "Stack refreshed successfully: dev");
    assert_eq!(result.summary.unwrap().delete, 1);

    // The next up puts the policy back
    let up = manager.execute(&identity(), &spec(), "up").await.unwrap();
    assert_eq!(up.summary.unwrap().create, 1);
}

#[tokio::test]
async fn test_unknown_action_never_reaches_engine() {
    let engine = Arc::new(CountingEngine::default());
    let manager = StackLifecycleManager::new(engine.clone());

    let err = manager
        .execute(&identity(), &spec(), "deploy")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown action: deploy");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.calls(), 0);

    let stack = manager.resolve(&identity(), &spec()).await.unwrap();
    let calls = engine.calls();
    let err = manager.run(&stack, "preview").await.unwrap_err();
    assert!(matches!(err, LifecycleError::UnknownAction(ref name) if name == "preview"));
    assert_eq!(engine.calls(), calls);
}

#[tokio::test]
async fn test_cancel_without_operation_is_verbatim() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine);

    let err = manager
        .execute(&identity(), &spec(), "cancel")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Operation {
            action: LifecycleAction::Cancel,
            source: EngineError::NoOperationInProgress(_),
        }
    ));
    assert_eq!(
        err.to_string(),
        "no update is in progress for stack sitestack/dev"
    );
}

#[tokio::test]
async fn test_cancel_rolls_back_in_flight_up() {
    let engine = Arc::new(MemoryEngine::new().with_step_delay(Duration::from_millis(50)));
    let manager = Arc::new(manager(engine.clone()));

    let running = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.execute(&identity(), &spec(), "up").await })
    };

    tokio::time::sleep(Duration::from_millis(75)).await;
    assert_eq!(engine.status(&identity()), StackStatus::OperationInFlight);

    let canceled = manager
        .execute(&identity(), &spec(), "cancel")
        .await
        .unwrap();
    assert_eq!(canceled.message, "Stack successfully canceled: dev");

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Operation {
            source: EngineError::Canceled(_),
            ..
        }
    ));
    assert_eq!(engine.status(&identity()), StackStatus::Absent);
}

#[tokio::test]
async fn test_concurrent_up_is_rejected_by_engine() {
    let engine = Arc::new(MemoryEngine::new().with_step_delay(Duration::from_millis(50)));
    let manager = Arc::new(manager(engine.clone()));

    let running = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.execute(&identity(), &spec(), "up").await })
    };
    tokio::time::sleep(Duration::from_millis(25)).await;

    let err = manager
        .execute(&identity(), &spec(), "up")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert!(running.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_invalid_spec_fails_before_engine() {
    let engine = Arc::new(CountingEngine::default());
    let manager = StackLifecycleManager::new(engine.clone());

    let err = manager
        .execute(&identity(), &ResourceSpec::new("", "hi"), "up")
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidSpec(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.calls(), 0);

    let err = manager
        .resolve(&StackIdentity::new("sitestack", ""), &spec())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidSpec(_)));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_config_propagated_on_every_resolve() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine.clone()).with_settings(ProviderSettings {
        profile: "ops".to_string(),
        region: "eu-west-1".to_string(),
    });

    manager.resolve(&identity(), &spec()).await.unwrap();
    let config = engine.config(&identity()).unwrap();
    assert_eq!(config["aws:profile"].value, "ops");
    assert_eq!(config["aws:region"].value, "eu-west-1");
    assert_eq!(spec_from_config(&config, "dev"), Some(spec()));

    let updated = ResourceSpec::new("my-bucket", "second");
    manager.resolve(&identity(), &updated).await.unwrap();
    let config = engine.config(&identity()).unwrap();
    assert_eq!(spec_from_config(&config, "dev"), Some(updated));
}

#[tokio::test]
async fn test_region_drives_endpoint() {
    let engine = Arc::new(MemoryEngine::new());
    let manager = manager(engine).with_settings(ProviderSettings {
        profile: "dev".to_string(),
        region: "eu-west-1".to_string(),
    });

    let result = manager.execute(&identity(), &spec(), "up").await.unwrap();
    assert_eq!(
        result.message,
        "Website URL: my-bucket.s3-website-eu-west-1.amazonaws.com"
    );
}

#[tokio::test]
async fn test_pooled_manager_resolves_once() {
    let engine = Arc::new(CountingEngine::default());
    let manager = StackLifecycleManager::new(engine.clone())
        .with_progress(Arc::new(NoProgress))
        .with_pool(SessionPool::new(Duration::from_secs(60)));

    manager.execute(&identity(), &spec(), "up").await.unwrap();
    manager.execute(&identity(), &spec(), "up").await.unwrap();
    assert_eq!(manager.pool().map(SessionPool::len), Some(1));

    manager
        .execute(&identity(), &spec(), "destroy")
        .await
        .unwrap();
    assert_eq!(manager.pool().map(SessionPool::len), Some(0));

    manager.shutdown().await;
}
