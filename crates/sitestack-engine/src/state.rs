//! Recorded state of a stack
//!
//! What an engine remembers about the resources it applied. The in-memory
//! engine keeps one [`StackState`] per identity and compares it with the
//! program on every `up`.

use crate::engine::Outputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a stack identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// No resources recorded
    Absent,
    /// Resources recorded, nothing running
    Active,
    /// An up/refresh/destroy is running
    OperationInFlight,
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackStatus::Absent => write!(f, "absent"),
            StackStatus::Active => write!(f, "active"),
            StackStatus::OperationInFlight => write!(f, "operation-in-flight"),
        }
    }
}

/// Resources and outputs recorded for one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by logical name
    pub resources: BTreeMap<String, ResourceState>,

    /// Outputs from the last successful `up`
    pub outputs: Outputs,
}

impl Default for StackState {
    fn default() -> Self {
        Self {
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: Outputs::new(),
        }
    }
}

impl StackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, state: ResourceState) {
        self.resources.insert(state.name.clone(), state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, name: &str) -> Option<ResourceState> {
        let result = self.resources.remove(name);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, name: &str) -> Option<&ResourceState> {
        self.resources.get(name)
    }

    /// Resources newest first, the order they can safely be deleted in
    pub fn deletion_order(&self) -> Vec<&ResourceState> {
        let mut resources: Vec<&ResourceState> = self.resources.values().collect();
        resources.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        resources
    }

    /// Next creation sequence number
    pub fn next_sequence(&self) -> u64 {
        self.resources
            .values()
            .map(|r| r.sequence + 1)
            .max()
            .unwrap_or(0)
    }
}

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Logical name
    pub name: String,

    /// Provider type token
    pub resource_type: String,

    /// Current status
    pub status: ResourceStatus,

    /// Unresolved inputs the resource was applied with
    pub inputs: serde_json::Value,

    /// Resolved attributes (id, arn, endpoints, ...)
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Creation order within the stack
    pub sequence: u64,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Creating,
            inputs: serde_json::Value::Null,
            attributes: BTreeMap::new(),
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is being created
    Creating,
    /// Resource exists and matches its inputs
    Ready,
    /// Resource is being deleted
    Deleting,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Deleting => write!(f, "deleting"),
        }
    }
}
