//! In-process provisioning engine
//!
//! Keeps stack state in memory and models the remote provider as a second
//! map, so that `refresh` has something to reconcile against. Operations are
//! serialized per stack identity exactly like a real engine: a second
//! `up`/`refresh`/`destroy` while one is in flight is rejected, and `cancel`
//! rolls the stack back to where it was when the aborted operation started.
//!
//! Used by the test suites and by `sitestackd --engine memory`.

use crate::action::{ChangeKind, OperationResult, Plan, ResourceChange, UpResult};
use crate::engine::{
    ConfigMap, OutputValue, Outputs, ProgressSink, ProvisioningEngine, StackHandle, StackIdentity,
};
use crate::error::{EngineError, Result};
use crate::graph::{Resource, ResourceGraph, resolve_value};
use crate::state::{ResourceState, ResourceStatus, StackState, StackStatus};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const DEFAULT_REGION: &str = "us-east-1";
const REGION_KEY: &str = "aws:region";

/// Order in which `up` walks the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyOrder {
    /// Topological order of the dependency graph
    #[default]
    Dependency,
    /// Declaration order, ignoring edges. Dependencies are still verified at
    /// every step, so a graph that declares a dependent first is rejected.
    Declaration,
}

/// In-memory provisioning engine
#[derive(Default)]
pub struct MemoryEngine {
    inner: Mutex<Inner>,
    step_delay: Duration,
    order: ApplyOrder,
}

#[derive(Default)]
struct Inner {
    stacks: HashMap<StackIdentity, StackRecord>,

    /// What actually exists at the provider, per stack and logical name
    remote: HashMap<StackIdentity, BTreeMap<String, ResourceState>>,
}

#[derive(Default)]
struct StackRecord {
    program: ResourceGraph,
    config: ConfigMap,
    state: StackState,
    in_flight: Option<Arc<AtomicBool>>,
}

struct Snapshot {
    state: StackState,
    remote: BTreeMap<String, ResourceState>,
}

/// Clears the in-flight marker when the operation ends, however it ends
struct OperationGuard<'a> {
    engine: &'a MemoryEngine,
    identity: StackIdentity,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.engine.inner.lock() {
            if let Some(record) = inner.stacks.get_mut(&self.identity) {
                record.in_flight = None;
            }
        }
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep between resource steps, leaving a window for `cancel`
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_apply_order(mut self, order: ApplyOrder) -> Self {
        self.order = order;
        self
    }

    /// Lifecycle state of a stack identity
    pub fn status(&self, identity: &StackIdentity) -> StackStatus {
        let Ok(inner) = self.inner.lock() else {
            return StackStatus::Absent;
        };
        match inner.stacks.get(identity) {
            Some(record) if record.in_flight.is_some() => StackStatus::OperationInFlight,
            Some(record) if !record.state.is_empty() => StackStatus::Active,
            _ => StackStatus::Absent,
        }
    }

    /// Copy of the recorded state
    pub fn state(&self, identity: &StackIdentity) -> Option<StackState> {
        let inner = self.inner.lock().ok()?;
        inner.stacks.get(identity).map(|r| r.state.clone())
    }

    /// Copy of the configuration set on a stack
    pub fn config(&self, identity: &StackIdentity) -> Option<ConfigMap> {
        let inner = self.inner.lock().ok()?;
        inner.stacks.get(identity).map(|r| r.config.clone())
    }

    /// Change an attribute of a remote resource behind the engine's back
    pub fn set_remote_attribute(
        &self,
        identity: &StackIdentity,
        resource: &str,
        key: &str,
        value: Value,
    ) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        match inner
            .remote
            .get_mut(identity)
            .and_then(|r| r.get_mut(resource))
        {
            Some(state) => {
                state.set_attribute(key, value);
                true
            }
            None => false,
        }
    }

    /// Delete a remote resource behind the engine's back
    pub fn remove_remote(&self, identity: &StackIdentity, resource: &str) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        inner
            .remote
            .get_mut(identity)
            .and_then(|r| r.remove(resource))
            .is_some()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| EngineError::StateError("engine state lock poisoned".to_string()))
    }

    /// Mark the stack busy and snapshot it for rollback
    fn begin(&self, identity: &StackIdentity) -> Result<(Arc<AtomicBool>, Snapshot)> {
        let mut inner = self.lock()?;
        let remote = inner.remote.get(identity).cloned().unwrap_or_default();
        let record = inner
            .stacks
            .get_mut(identity)
            .ok_or_else(|| EngineError::StackNotFound(identity.to_string()))?;

        if record.in_flight.is_some() {
            return Err(EngineError::ConcurrentUpdate(format!(
                "another operation is already running on stack {}",
                identity
            )));
        }

        let flag = Arc::new(AtomicBool::new(false));
        record.in_flight = Some(flag.clone());
        let snapshot = Snapshot {
            state: record.state.clone(),
            remote,
        };
        Ok((flag, snapshot))
    }

    fn restore(&self, identity: &StackIdentity, snapshot: Snapshot) -> Result<()> {
        let mut inner = self.lock()?;
        inner.remote.insert(identity.clone(), snapshot.remote);
        if let Some(record) = inner.stacks.get_mut(identity) {
            record.state = snapshot.state;
        }
        Ok(())
    }

    async fn pause_and_check(
        &self,
        identity: &StackIdentity,
        flag: &AtomicBool,
        snapshot: &mut Option<Snapshot>,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        if flag.load(Ordering::SeqCst) {
            if let Some(snapshot) = snapshot.take() {
                self.restore(identity, snapshot)?;
            }
            progress.line("operation canceled, stack restored");
            return Err(EngineError::Canceled(identity.to_string()));
        }
        Ok(())
    }

    /// Bring one recorded resource in line with what actually exists
    fn reconcile(&self, identity: &StackIdentity, resource: &ResourceState) -> Result<ChangeKind> {
        let mut inner = self.lock()?;
        let Inner { stacks, remote } = &mut *inner;
        let record = stacks
            .get_mut(identity)
            .ok_or_else(|| EngineError::StackNotFound(identity.to_string()))?;

        let kind = match remote.get(identity).and_then(|a| a.get(&resource.name)) {
            None => {
                record.state.remove_resource(&resource.name);
                ChangeKind::Delete
            }
            Some(real) if real.attributes != resource.attributes => {
                record.state.set_resource(real.clone());
                ChangeKind::Update
            }
            Some(_) => ChangeKind::Same,
        };
        Ok(kind)
    }

    fn ordered(&self, program: &ResourceGraph) -> Result<Vec<Resource>> {
        let order = match self.order {
            ApplyOrder::Dependency => program.apply_order()?.into_iter().cloned().collect(),
            ApplyOrder::Declaration => program.resources().to_vec(),
        };
        Ok(order)
    }

    fn apply_resource(&self, identity: &StackIdentity, resource: &Resource) -> Result<()> {
        let mut inner = self.lock()?;
        let Inner { stacks, remote } = &mut *inner;
        let record = stacks
            .get_mut(identity)
            .ok_or_else(|| EngineError::StackNotFound(identity.to_string()))?;

        let region = record
            .config
            .get(REGION_KEY)
            .map(|v| v.value.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let state = &record.state;
        let resolved = resolve_value(&resource.properties, &|name, attribute| {
            lookup(state, name, attribute)
        })?;

        let previous = state.get_resource(&resource.name);
        let sequence = previous
            .map(|p| p.sequence)
            .unwrap_or_else(|| state.next_sequence());
        let created_at = previous.map(|p| p.created_at);

        let mut applied = ResourceState::new(&resource.name, &resource.kind)
            .with_status(ResourceStatus::Ready)
            .with_inputs(resource.properties.clone())
            .with_sequence(sequence);
        applied.attributes = derive_attributes(resource, &resolved, &region);
        if let Some(created_at) = created_at {
            applied.created_at = created_at;
        }

        remote
            .entry(identity.clone())
            .or_default()
            .insert(resource.name.clone(), applied.clone());
        record.state.set_resource(applied);
        Ok(())
    }

    fn delete_resource(&self, identity: &StackIdentity, name: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(remote) = inner.remote.get_mut(identity) {
            remote.remove(name);
        }
        if let Some(record) = inner.stacks.get_mut(identity) {
            record.state.remove_resource(name);
        }
        Ok(())
    }

    fn export_outputs(&self, identity: &StackIdentity, program: &ResourceGraph) -> Result<Outputs> {
        let mut inner = self.lock()?;
        let record = inner
            .stacks
            .get_mut(identity)
            .ok_or_else(|| EngineError::StackNotFound(identity.to_string()))?;

        let mut outputs = Outputs::new();
        for (name, expression) in program.outputs() {
            let state = &record.state;
            let value = resolve_value(&Value::String(expression.clone()), &|n, a| {
                lookup(state, n, a)
            })?;
            outputs.insert(name.clone(), OutputValue::new(value));
        }
        record.state.outputs = outputs.clone();
        Ok(outputs)
    }
}

fn lookup(state: &StackState, name: &str, attribute: Option<&str>) -> Option<Value> {
    let resource = state.get_resource(name)?;
    let path = attribute.unwrap_or("id");
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut value = resource.attributes.get(first)?;
    for segment in segments {
        value = value.get(segment)?;
    }
    Some(value.clone())
}

/// Attributes a provider would report back for a resource
fn derive_attributes(resource: &Resource, resolved: &Value, region: &str) -> BTreeMap<String, Value> {
    let mut attributes: BTreeMap<String, Value> = resolved
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let id = match resource.kind.as_str() {
        "aws:s3:Bucket" => {
            let bucket = resolved
                .get("bucket")
                .and_then(Value::as_str)
                .unwrap_or(resource.name.as_str())
                .to_string();
            attributes.insert("arn".to_string(), json!(format!("arn:aws:s3:::{}", bucket)));
            if resolved.get("website").is_some() {
                attributes.insert(
                    "websiteEndpoint".to_string(),
                    json!(format!("{}.s3-website-{}.amazonaws.com", bucket, region)),
                );
            }
            bucket
        }
        _ => resource.name.clone(),
    };
    attributes.insert("id".to_string(), json!(id));
    attributes
}

fn plan_up(order: &[Resource], state: &StackState, program: &ResourceGraph) -> Plan {
    let mut changes: Vec<ResourceChange> = order
        .iter()
        .map(|resource| {
            let kind = match state.get_resource(&resource.name) {
                None => ChangeKind::Create,
                Some(existing) if existing.inputs != resource.properties => ChangeKind::Update,
                Some(_) => ChangeKind::Same,
            };
            ResourceChange::new(&resource.name, &resource.kind, kind)
        })
        .collect();

    changes.extend(
        state
            .deletion_order()
            .into_iter()
            .filter(|r| program.get(&r.name).is_none())
            .map(|r| ResourceChange::new(&r.name, &r.resource_type, ChangeKind::Delete)),
    );

    Plan::new(changes)
}

#[async_trait]
impl ProvisioningEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_or_select_stack(
        &self,
        identity: &StackIdentity,
        program: &ResourceGraph,
    ) -> Result<StackHandle> {
        program.validate()?;

        let mut inner = self.lock()?;
        match inner.stacks.get_mut(identity) {
            Some(record) => {
                tracing::debug!("Selected stack {}", identity);
                record.program = program.clone();
            }
            None => {
                tracing::info!("Created stack {}", identity);
                inner.stacks.insert(
                    identity.clone(),
                    StackRecord {
                        program: program.clone(),
                        ..Default::default()
                    },
                );
            }
        }
        Ok(StackHandle::new(identity.clone(), identity.to_string()))
    }

    async fn install_program(&self, stack: &StackHandle, program: &ResourceGraph) -> Result<()> {
        program.validate()?;

        let mut inner = self.lock()?;
        let record = inner
            .stacks
            .get_mut(stack.identity())
            .ok_or_else(|| EngineError::StackNotFound(stack.identity().to_string()))?;
        record.program = program.clone();
        Ok(())
    }

    async fn set_config(&self, stack: &StackHandle, config: &ConfigMap) -> Result<()> {
        let mut inner = self.lock()?;
        let record = inner
            .stacks
            .get_mut(stack.identity())
            .ok_or_else(|| EngineError::StackNotFound(stack.identity().to_string()))?;
        for (key, value) in config {
            record.config.insert(key.clone(), value.clone());
        }
        tracing::debug!("Set {} config values on {}", config.len(), stack.identity());
        Ok(())
    }

    async fn up(&self, stack: &StackHandle, progress: &dyn ProgressSink) -> Result<UpResult> {
        let start = Instant::now();
        let identity = stack.identity();

        let (program, order, plan) = {
            let inner = self.lock()?;
            let record = inner
                .stacks
                .get(identity)
                .ok_or_else(|| EngineError::StackNotFound(identity.to_string()))?;

            let program = record.program.clone();
            for resource in program.resources() {
                if let Some(existing) = record.state.get_resource(&resource.name) {
                    if existing.resource_type != resource.kind {
                        return Err(EngineError::ResourceConflict(format!(
                            "{} already exists as {}, declared as {}",
                            resource.name, existing.resource_type, resource.kind
                        )));
                    }
                }
            }

            let order = self.ordered(&program)?;
            let plan = plan_up(&order, &record.state, &program);
            (program, order, plan)
        };

        let (flag, snapshot) = self.begin(identity)?;
        let _guard = OperationGuard {
            engine: self,
            identity: identity.clone(),
        };
        let mut snapshot = Some(snapshot);

        progress.line(&format!("Updating ({}):", identity));

        let mut done: HashSet<String> = HashSet::new();
        for resource in &order {
            let Some(change) = plan.changes.iter().find(|c| c.resource == resource.name) else {
                continue;
            };

            if change.kind != ChangeKind::Same {
                self.pause_and_check(identity, &flag, &mut snapshot, progress)
                    .await?;
            }

            if let Some(missing) = resource
                .dependencies()
                .into_iter()
                .find(|d| !done.contains(d))
            {
                return Err(EngineError::ProviderRejected(format!(
                    "{} {} cannot be applied before its dependency {}",
                    resource.kind, resource.name, missing
                )));
            }

            if change.kind != ChangeKind::Same {
                self.apply_resource(identity, resource)?;
                progress.line(&format!("    {}", change));
            }
            done.insert(resource.name.clone());
        }

        for change in plan.changes_by_kind(ChangeKind::Delete) {
            self.pause_and_check(identity, &flag, &mut snapshot, progress)
                .await?;
            self.delete_resource(identity, &change.resource)?;
            progress.line(&format!("    {}", change));
        }

        let outputs = self.export_outputs(identity, &program)?;
        let summary = plan.summary();
        progress.line(&format!("Resources: {}", summary));

        Ok(UpResult {
            outputs,
            summary,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn refresh(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        let start = Instant::now();
        let identity = stack.identity();
        let (flag, snapshot) = self.begin(identity)?;
        let _guard = OperationGuard {
            engine: self,
            identity: identity.clone(),
        };

        let recorded: Vec<ResourceState> = snapshot.state.resources.values().cloned().collect();
        let mut snapshot = Some(snapshot);

        progress.line(&format!("Refreshing ({}):", identity));

        let mut changes = Vec::with_capacity(recorded.len());
        for resource in &recorded {
            self.pause_and_check(identity, &flag, &mut snapshot, progress)
                .await?;
            let kind = self.reconcile(identity, resource)?;
            let change = ResourceChange::new(&resource.name, &resource.resource_type, kind);
            if kind != ChangeKind::Same {
                progress.line(&format!("    {}", change));
            }
            changes.push(change);
        }

        let summary = Plan::new(changes).summary();
        progress.line(&format!("Resources: {}", summary));
        Ok(OperationResult {
            summary,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn destroy(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        let start = Instant::now();
        let identity = stack.identity();
        let (flag, snapshot) = self.begin(identity)?;
        let _guard = OperationGuard {
            engine: self,
            identity: identity.clone(),
        };

        let changes: Vec<ResourceChange> = snapshot
            .state
            .deletion_order()
            .into_iter()
            .map(|r| ResourceChange::new(&r.name, &r.resource_type, ChangeKind::Delete))
            .collect();
        let mut snapshot = Some(snapshot);

        progress.line(&format!("Destroying ({}):", identity));

        for change in &changes {
            self.pause_and_check(identity, &flag, &mut snapshot, progress)
                .await?;
            self.delete_resource(identity, &change.resource)?;
            progress.line(&format!("    {}", change));
        }

        {
            let mut inner = self.lock()?;
            if let Some(record) = inner.stacks.get_mut(identity) {
                record.state.outputs.clear();
            }
        }

        let summary = Plan::new(changes).summary();
        progress.line(&format!("Resources: {}", summary));
        Ok(OperationResult {
            summary,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn cancel(&self, stack: &StackHandle) -> Result<()> {
        let inner = self.lock()?;
        let identity = stack.identity();
        let record = inner
            .stacks
            .get(identity)
            .ok_or_else(|| EngineError::StackNotFound(identity.to_string()))?;

        match &record.in_flight {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                tracing::info!("Cancel requested for stack {}", identity);
                Ok(())
            }
            None => Err(EngineError::NoOperationInProgress(format!(
                "no update is in progress for stack {}",
                identity
            ))),
        }
    }
}
