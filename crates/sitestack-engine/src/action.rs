//! Change types reported by lifecycle operations

use crate::engine::Outputs;
use serde::{Deserialize, Serialize};

/// A planned or applied change to a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Logical resource name
    pub resource: String,

    /// Provider type token
    pub resource_type: String,

    /// Kind of change
    pub kind: ChangeKind,
}

impl ResourceChange {
    pub fn new(resource: impl Into<String>, resource_type: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            resource: resource.into(),
            resource_type: resource_type.into(),
            kind,
        }
    }
}

impl std::fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marker = match self.kind {
            ChangeKind::Create => "+",
            ChangeKind::Update => "~",
            ChangeKind::Delete => "-",
            ChangeKind::Same => " ",
        };
        write!(f, "{} {} {} {}", marker, self.resource_type, self.resource, self.kind)
    }
}

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    Same,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
            ChangeKind::Same => write!(f, "same"),
        }
    }
}

/// Ordered set of changes for one operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Changes in the order they are applied
    pub changes: Vec<ResourceChange>,

    /// Whether the plan changes anything
    pub has_changes: bool,
}

impl Plan {
    pub fn new(changes: Vec<ResourceChange>) -> Self {
        let has_changes = changes.iter().any(|c| c.kind != ChangeKind::Same);
        Self {
            changes,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Get changes by kind
    pub fn changes_by_kind(&self, kind: ChangeKind) -> Vec<&ResourceChange> {
        self.changes.iter().filter(|c| c.kind == kind).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.changes_by_kind(ChangeKind::Create).len(),
            update: self.changes_by_kind(ChangeKind::Update).len(),
            delete: self.changes_by_kind(ChangeKind::Delete).len(),
            same: self.changes_by_kind(ChangeKind::Same).len(),
        }
    }
}

/// Counts of changes by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub same: usize,
}

impl PlanSummary {
    pub fn has_changes(&self) -> bool {
        self.create + self.update + self.delete > 0
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.same
        )
    }
}

/// Result of `refresh` or `destroy`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResult {
    pub summary: PlanSummary,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

/// Result of `up`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpResult {
    /// Outputs exported by the program after the update
    pub outputs: Outputs,

    pub summary: PlanSummary,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}
