//! Provisioning engine trait definition

use crate::action::{OperationResult, UpResult};
use crate::error::Result;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provisioning engine abstraction trait
///
/// The engine owns stack state: it upserts stacks, serializes operations per
/// stack identity, and turns a [`ResourceGraph`] into remote provider calls.
/// Callers only hold [`StackHandle`]s.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Returns the engine name (e.g., "memory", "pulumi")
    fn name(&self) -> &str;

    /// Create the stack if it does not exist, otherwise select it, and bind
    /// `program` as its desired state.
    async fn create_or_select_stack(
        &self,
        identity: &StackIdentity,
        program: &ResourceGraph,
    ) -> Result<StackHandle>;

    /// Replace the program bound to an already resolved stack
    async fn install_program(&self, stack: &StackHandle, program: &ResourceGraph) -> Result<()>;

    /// Set every key in `config` on the stack (last writer wins per key)
    async fn set_config(&self, stack: &StackHandle, config: &ConfigMap) -> Result<()>;

    /// Create or update resources to match the program
    async fn up(&self, stack: &StackHandle, progress: &dyn ProgressSink) -> Result<UpResult>;

    /// Reconcile recorded state with the actual remote state
    async fn refresh(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult>;

    /// Delete every resource recorded in the stack
    async fn destroy(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult>;

    /// Abort the operation currently running against the stack
    async fn cancel(&self, stack: &StackHandle) -> Result<()>;

    /// Tear down any session resources held for the handle
    async fn release(&self, _stack: &StackHandle) -> Result<()> {
        Ok(())
    }
}

/// The (project, stack) pair naming a deployment unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackIdentity {
    pub project: String,
    pub stack: String,
}

impl StackIdentity {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
        }
    }
}

impl std::fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project, self.stack)
    }
}

/// A live binding to a named stack inside an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackHandle {
    identity: StackIdentity,

    /// Engine specific session reference (workspace path, map key, ...)
    session: String,
}

impl StackHandle {
    pub fn new(identity: StackIdentity, session: impl Into<String>) -> Self {
        Self {
            identity,
            session: session.into(),
        }
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.stack
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,

    #[serde(default)]
    pub secret: bool,
}

impl ConfigValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: true,
        }
    }
}

/// Flat `namespace:key` -> value configuration
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A typed output exported by a program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: serde_json::Value,

    #[serde(default)]
    pub secret: bool,
}

impl OutputValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            secret: false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Output name -> value
pub type Outputs = BTreeMap<String, OutputValue>;

/// Operator-visible sink for progress text streamed during an operation
pub trait ProgressSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Writes progress lines to the `sitestack::progress` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn line(&self, line: &str) {
        tracing::info!(target: "sitestack::progress", "{}", line);
    }
}

/// Discards all progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn line(&self, _line: &str) {}
}
